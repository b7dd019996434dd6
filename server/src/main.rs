//! Turnstile HTTP server entry point.

use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_core::engine::ValidationEngine;
use turnstile_core::environment::SystemClock;
use turnstile_core::store::TicketStore;
use turnstile_postgres::PostgresTicketStore;
use turnstile_server::mail::{ConsoleTicketMailer, SmtpTicketMailer, TicketMailer};
use turnstile_server::{build_router, AppState, Config, TicketIssuer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "turnstile_core=info,turnstile_postgres=info,turnstile_server=info,tower_http=debug".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Turnstile HTTP Server");

    let config = Config::from_env();
    info!(
        database_url = %config.database.url,
        mail_provider = %config.mail.provider,
        "Configuration loaded"
    );

    // Metrics: register descriptions, then expose a Prometheus scrape
    // endpoint on the metrics port.
    turnstile_server::metrics::register_business_metrics();
    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    info!(address = %metrics_addr, "Prometheus exporter listening");

    // Database pool and store
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await?;
    let store: Arc<dyn TicketStore> = Arc::new(
        PostgresTicketStore::new(pool.clone())
            .with_lock_timeout(config.database.lock_timeout_ms),
    );
    info!("Database connected");

    // Mail sink
    let mailer: Arc<dyn TicketMailer> = if config.mail.provider == "smtp" {
        Arc::new(SmtpTicketMailer::new(
            config.mail.smtp_server.clone(),
            config.mail.smtp_port,
            config.mail.smtp_username.clone(),
            config.mail.smtp_password.clone(),
            config.mail.from_email.clone(),
            config.mail.from_name.clone(),
        ))
    } else {
        Arc::new(ConsoleTicketMailer)
    };

    // Engine + issuance over the shared store
    let clock = Arc::new(SystemClock);
    let engine = Arc::new(ValidationEngine::new(store.clone(), clock.clone()));
    let issuer = Arc::new(TicketIssuer::new(store, mailer, clock));

    let state = AppState::new(engine, issuer, Some(pool));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for Ctrl+C (SIGINT) or SIGTERM (in production environments).
#[allow(clippy::expect_used)] // Failing to install signal handlers is fatal at startup
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
