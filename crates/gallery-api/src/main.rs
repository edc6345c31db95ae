//! Image Gallery resource server

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gallery_api::config::Config;
use gallery_model::endpoints;
use gallery_api::repository::FileGalleryRepository;
use gallery_api::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "gallery-api")]
#[command(about = "Bearer-protected REST API of the Image Gallery")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = endpoints::API_PORT, env = "GALLERY_API_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "GALLERY_API_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "./api-config", env = "GALLERY_API_CONFIG_PATH")]
    config_path: String,

    /// Directory holding image metadata and files
    #[arg(long, default_value = "./gallery-data", env = "GALLERY_API_DATA_PATH")]
    data_path: String,

    /// Identity provider URL; overrides `authority` from config.json
    #[arg(long, env = "GALLERY_API_AUTHORITY")]
    authority: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_api=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config_path)?;
    if let Some(authority) = cli.authority {
        config.authority = authority;
    }
    let repository = FileGalleryRepository::open(&cli.data_path).await?;

    tracing::info!("Trusting tokens from {}", config.authority);
    let state = Arc::new(AppState::new(config, Arc::new(repository)));
    let app = router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    tracing::info!("Starting gallery-api on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gallery API shut down");
    Ok(())
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
