//! Image Gallery web client

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gallery_client::config::Config;
use gallery_client::{router, AppState};
use gallery_model::endpoints;

#[derive(Parser, Debug)]
#[command(name = "gallery-client")]
#[command(about = "Image Gallery web client signing in through OpenID Connect")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = endpoints::CLIENT_PORT, env = "GALLERY_CLIENT_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "GALLERY_CLIENT_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "./client-config", env = "GALLERY_CLIENT_CONFIG_PATH")]
    config_path: String,

    /// Public URL of this client; redirect URIs are built from it
    #[arg(long, default_value = endpoints::CLIENT_URL, env = "GALLERY_CLIENT_PUBLIC_URL")]
    public_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_client=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config_path)?;
    tracing::info!(
        "Signing in at {} as {}",
        config.authority,
        config.client_id
    );

    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs.max(1));
    let state = Arc::new(AppState::new(config, &cli.public_url));

    // Periodically drop expired sessions and abandoned sign-ins
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            sweeper.sessions.cleanup_expired();
            sweeper.challenges.cleanup_expired();
        }
    });

    let app = router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    tracing::info!("Starting gallery-client on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gallery client shut down");
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
