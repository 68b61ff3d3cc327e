use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// How the secret for a login attempt is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Six-digit one-time code typed back by the user.
    #[default]
    Code,
    /// Single-use sign-in link embedding an opaque token.
    Link,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartLoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    /// Subdomain the user started login from; pins the session when set.
    #[schema(example = "book.example.com")]
    pub host: Option<String>,

    #[schema(example = "Alice")]
    pub first_name: Option<String>,

    #[serde(default)]
    pub method: LoginMethod,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyCodeRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Code is required"))]
    #[schema(example = "482193")]
    pub code: String,

    #[schema(example = "book.example.com")]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub token: String,
}
