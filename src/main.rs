use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mercado::config::Config;
use mercado::notifications::Mailer;
use mercado::AppState;

#[derive(Parser, Debug)]
#[command(name = "mercado")]
#[command(author, version, about = "A small marketplace REST backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mercado.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mercado v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data and upload directories exist
    let upload_dir = config.server.data_dir.join("uploads");
    std::fs::create_dir_all(&config.server.data_dir)?;
    std::fs::create_dir_all(&upload_dir)?;

    // Initialize database
    let db = mercado::db::init(&config.server.data_dir).await?;

    if !config.email.is_configured() {
        tracing::warn!("SMTP is not configured; password-reset requests will fail");
    }
    let mailer = Mailer::new(config.email.clone());

    // Create app state and router
    let state = std::sync::Arc::new(AppState::new(config.clone(), db, mailer));
    let app = mercado::api::create_router(state)
        .nest_service("/uploads", ServeDir::new(&upload_dir));

    // Start API server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
