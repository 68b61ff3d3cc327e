use service_core::error::AppError;
use thiserror::Error;

/// Every way an authentication step can fail. Variants carry the internal
/// cause for logging; the HTTP boundary collapses all proof failures into
/// one generic 401 so responses never reveal which check rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("code or link expired")]
    Expired,

    #[error("too many attempts")]
    RateLimited,

    #[error("invalid code")]
    InvalidCode,

    #[error("invalid or malformed session token")]
    InvalidSignature,

    #[error("session revoked")]
    Revoked,

    #[error("session pinned to another host")]
    HostMismatch,

    #[error("token not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Store(#[source] anyhow::Error),

    #[error("license lookup failed: {0}")]
    Licensing(#[source] anyhow::Error),

    #[error("email delivery failed: {0}")]
    Email(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for failures of proof or entitlement inputs, which all surface
    /// as an undifferentiated 401 at the boundary.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Expired
                | AuthError::RateLimited
                | AuthError::InvalidCode
                | AuthError::InvalidSignature
                | AuthError::Revoked
                | AuthError::HostMismatch
                | AuthError::NotFound
                | AuthError::Licensing(_)
        )
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        if err.is_auth_failure() {
            tracing::info!(cause = %err, "authentication rejected");
            return AppError::Unauthorized(anyhow::anyhow!("unauthorized"));
        }
        match err {
            AuthError::Store(e) => {
                tracing::error!(error = %e, "credential store unavailable");
                AppError::ServiceUnavailable
            }
            AuthError::Email(msg) => {
                tracing::error!(error = %msg, "email delivery failed");
                AppError::InternalError(anyhow::anyhow!(msg))
            }
            AuthError::Internal(e) => AppError::InternalError(e),
            // is_auth_failure covered everything else above
            _ => AppError::Unauthorized(anyhow::anyhow!("unauthorized")),
        }
    }
}
