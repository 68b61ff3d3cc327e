use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{handlers::auth::SESSION_COOKIE, utils::normalize_host, AppState};

/// Forward-auth check for the upstream proxy
///
/// Called once per proxied request, so this path is read-only: one JWT
/// verification, at most one revocation lookup, and a license read only
/// when the host maps to a protected scope. Plain-text bodies; the proxy
/// keys off the status code alone.
#[utoipa::path(
    get,
    path = "/authz",
    responses(
        (status = 200, description = "Session valid and entitled for the requesting host"),
        (status = 401, description = "Missing, invalid, expired, or revoked session"),
        (status = 403, description = "Valid session without entitlement for the requesting host")
    ),
    tag = "Authorization"
)]
pub async fn forward_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|value| value.to_str().ok())
        .map(normalize_host)
        .filter(|h| !h.is_empty());

    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    let claims = match state.sessions.verify(cookie.value(), host.as_deref()).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::info!(cause = %err, "session rejected");
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    };

    match state
        .entitlements
        .has_entitlement(&claims.sub, host.as_deref().unwrap_or(""))
        .await
    {
        Ok(true) => (StatusCode::OK, "ok").into_response(),
        Ok(false) => {
            tracing::info!(email = %claims.sub, host = ?host, "entitlement denied");
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
        Err(err) => {
            // fail closed when the licensing collaborator is unreachable
            tracing::warn!(error = %err, "entitlement check failed");
            (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
        }
    }
}
