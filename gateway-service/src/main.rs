use gateway_service::{
    build_router,
    config::GatewayConfig,
    db::{create_pool, run_migrations, PgStore},
    models::PermissionModel,
    services::SmtpMailer,
    AppState,
};
use service_core::middleware::install_prometheus_recorder;
use service_core::observability::logging::{init_tracing, shutdown_tracing};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = GatewayConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(service_core::error::AppError::ConfigError)?;

    let metrics = install_prometheus_recorder()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting gateway service"
    );

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);

    let state = AppState::new(
        config.clone(),
        store,
        mailer,
        PermissionModel::standard(),
        Some(metrics),
    )?;
    tracing::info!(
        gate_timeout_ms = config.admission.gate_timeout_ms,
        rate_per_second = config.admission.rate_per_second,
        rate_burst = config.admission.rate_burst,
        "Admission pipeline initialized"
    );

    let app = build_router(state)?;

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
}
