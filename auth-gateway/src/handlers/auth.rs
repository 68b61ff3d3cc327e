use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::{
    config::GatewayConfig,
    dtos::{
        auth::{CallbackQuery, LoginMethod, StartLoginRequest, VerifyCodeRequest},
        OkResponse,
    },
    utils::{normalize_email, normalize_host, ValidatedJson},
    AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// Build the session cookie: HTTP-only, secure, Lax, optionally scoped to
/// a shared parent domain for cross-subdomain single sign-on.
fn session_cookie(config: &GatewayConfig, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(config.session.session_ttl_min));
    if let Some(domain) = &config.session.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

fn clear_session_cookie(config: &GatewayConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO);
    if let Some(domain) = &config.session.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

/// Start a passwordless login
///
/// Responds identically for registered and unregistered addresses; a
/// secret is issued and emailed only when the address holds an active
/// license.
#[utoipa::path(
    post,
    path = "/auth/start",
    request_body = StartLoginRequest,
    responses(
        (status = 200, description = "Accepted (whether or not the address is registered)", body = OkResponse),
        (status = 400, description = "Missing or malformed email", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn start_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<StartLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);
    let host = req
        .host
        .as_deref()
        .map(normalize_host)
        .filter(|h| !h.is_empty());

    let registered = match state.licenses.active_licenses(&email).await {
        Ok(licenses) => !licenses.is_empty(),
        Err(e) => {
            tracing::warn!(error = %e, "license lookup failed during login start");
            false
        }
    };

    if !registered {
        // Do not reveal registration status; respond success
        return Ok(Json(OkResponse::ok()));
    }

    match req.method {
        LoginMethod::Code => {
            state
                .otp
                .issue(&email, host.as_deref(), req.first_name.as_deref())
                .await?;
        }
        LoginMethod::Link => {
            state
                .magic_links
                .issue(&email, host.as_deref(), req.first_name.as_deref())
                .await?;
        }
    }

    Ok(Json(OkResponse::ok()))
}

/// Exchange a one-time code for a session cookie
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = OkResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Code rejected", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_code(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);
    let host = req
        .host
        .as_deref()
        .map(normalize_host)
        .filter(|h| !h.is_empty());

    state.otp.verify(&email, req.code.trim()).await?;

    let token = state.sessions.issue(&email, host.as_deref())?;
    let jar = jar.add(session_cookie(&state.config, token));

    Ok((jar, Json(OkResponse::ok())))
}

/// Consume a magic link and establish a session
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Signed in; redirected to the originating host"),
        (status = 401, description = "Invalid, expired, or already-used link")
    ),
    tag = "Authentication"
)]
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let payload = match state.magic_links.consume(query.token.trim()).await {
        Ok(payload) => payload,
        Err(err) => {
            tracing::info!(cause = %err, "magic link rejected");
            return (StatusCode::UNAUTHORIZED, "Invalid or expired link").into_response();
        }
    };

    let token = match state.sessions.issue(&payload.email, payload.host.as_deref()) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(error = %err, "session issuance failed after link consumption");
            return AppError::from(err).into_response();
        }
    };

    let target = payload
        .host
        .as_deref()
        .map(|host| format!("https://{}", host))
        .unwrap_or_else(|| state.config.login.auth_base_url.clone());

    let jar = jar.add(session_cookie(&state.config, token));
    (StatusCode::FOUND, jar, [(header::LOCATION, target)]).into_response()
}

/// End the current session
///
/// Always succeeds from the client's perspective; the session id is added
/// to the revocation entries when the cookie decodes.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session revoked and cookie cleared", body = OkResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.sessions.revoke(cookie.value()).await {
            // logout must always appear to succeed
            tracing::warn!(error = %err, "session revocation failed");
        }
    }

    let jar = jar.add(clear_session_cookie(&state.config));
    (jar, Json(OkResponse::ok()))
}
