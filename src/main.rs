use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waav_agent::{AppError, ServerConfig, routes, spawn_idle_sweeper, state::AppState};

/// WaaV Agent - Streaming voice conversation server
#[derive(Parser, Debug)]
#[command(name = "waav-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Must be installed before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(AppError::from)?
    } else {
        ServerConfig::from_env().map_err(AppError::from)?
    };

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; sessions will fail to start");
    }

    let address = config.address();
    let sweep_interval = config.session_sweep_interval();
    let idle_timeout = config.session_idle_timeout();

    let app_state = AppState::new(config);

    let shutdown = CancellationToken::new();
    let sweeper = spawn_idle_sweeper(
        app_state.registry.clone(),
        sweep_interval,
        idle_timeout,
        shutdown.child_token(),
    );

    let app = routes::create_router(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid server address '{address}': {e}")))?;

    let listener = TcpListener::bind(&socket_addr).await.map_err(AppError::from)?;
    info!("Server listening on http://{}", socket_addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Server stopped");

    Ok(())
}
