use auth_gateway::{
    build_router,
    config::GatewayConfig,
    services::{InMemorySuppressions, MailgunMailer, PgLicenseDirectory, RedisStore},
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = GatewayConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authentication gateway"
    );

    // Credential store (codes, magic links, revocations)
    let store = Arc::new(
        RedisStore::new(&config.redis.url)
            .await
            .map_err(service_core::error::AppError::InternalError)?,
    );
    tracing::info!("Credential store initialized");

    // Read-only licensing directory owned by the storefront
    let licenses = Arc::new(
        PgLicenseDirectory::connect(&config.database.url)
            .await
            .map_err(service_core::error::AppError::InternalError)?,
    );
    tracing::info!("Licensing directory initialized");

    // Outbound mail with an injected suppression list
    let suppressions = Arc::new(InMemorySuppressions::new());
    let mailer = Arc::new(
        MailgunMailer::new(&config.mailgun, suppressions)
            .map_err(|e| service_core::error::AppError::InternalError(anyhow::anyhow!(e)))?,
    );
    tracing::info!("Mailer initialized");

    let shutdown_grace = config.common.shutdown_grace_seconds;
    let port = config.common.port;
    let state = AppState::new(config, store, licenses, mailer);

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_grace))
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(grace_seconds: u64) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Give in-flight requests time to complete
    tokio::time::sleep(tokio::time::Duration::from_secs(grace_seconds)).await;
}
