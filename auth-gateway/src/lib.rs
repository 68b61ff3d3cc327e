pub mod config;
pub mod dtos;
pub mod handlers;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, security_headers_middleware};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, GatewayConfig, SwaggerMode};
use crate::services::{
    CredentialStore, EntitlementGate, LicenseDirectory, MagicLinkService, Mailer,
    OtpAuthenticator, SessionService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::start_login,
        handlers::auth::verify_code,
        handlers::auth::callback,
        handlers::auth::logout,
        handlers::authz::forward_auth,
    ),
    components(
        schemas(
            dtos::auth::StartLoginRequest,
            dtos::auth::VerifyCodeRequest,
            dtos::auth::LoginMethod,
            dtos::OkResponse,
            dtos::ErrorResponse,
        )
    ),
    tags(
        (name = "Authentication", description = "Passwordless login and session lifecycle"),
        (name = "Authorization", description = "Forward-auth entitlement checks"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<dyn CredentialStore>,
    pub licenses: Arc<dyn LicenseDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub otp: OtpAuthenticator,
    pub magic_links: MagicLinkService,
    pub sessions: SessionService,
    pub entitlements: EntitlementGate,
}

impl AppState {
    /// Wire the service layer over the given collaborators.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
        licenses: Arc<dyn LicenseDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let otp = OtpAuthenticator::new(
            store.clone(),
            mailer.clone(),
            config.login.otp_ttl_min,
            config.login.otp_attempt_max,
        );
        let magic_links = MagicLinkService::new(
            store.clone(),
            mailer.clone(),
            &config.login.auth_base_url,
            config.login.magic_ttl_min,
        );
        let sessions = SessionService::new(
            &config.session.signing_secret,
            config.session.session_ttl_min,
            store.clone(),
        );
        let entitlements = EntitlementGate::new(config.entitlements.to_policy(), licenses.clone());

        Self {
            config,
            store,
            licenses,
            mailer,
            otp,
            magic_links,
            sessions,
            entitlements,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let mut app = Router::new().route("/healthz", get(health_check));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };

    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    }

    let cors_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter(|origin| {
            // a wildcard cannot be combined with credentialed cookies
            if *origin == "*" {
                tracing::error!("Ignoring wildcard CORS origin; cookies require explicit origins");
                return false;
            }
            true
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = app
        .route("/auth/start", post(handlers::auth::start_login))
        .route("/auth/verify", post(handlers::auth::verify_code))
        .route("/auth/callback", get(handlers::auth::callback))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/authz", get(handlers::authz::forward_auth))
        .with_state(state)
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(service_core::middleware::REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A backing store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "credential store health check failed");
        AppError::InternalError(e)
    })?;

    state.licenses.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "licensing health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "credential_store": "up",
            "licensing": "up"
        }
    })))
}
