//! OpenID Connect identity provider for the Image Gallery

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gallery_idp::config::Config;
use gallery_idp::keys::SigningCredential;
use gallery_idp::storage::ConfigurationStore;
use gallery_idp::{router, AppState};
use gallery_model::endpoints;

#[derive(Parser, Debug)]
#[command(name = "gallery-idp")]
#[command(about = "OpenID Connect identity provider for the Image Gallery")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = endpoints::IDP_PORT, env = "IDP_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "IDP_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "./idp-config", env = "IDP_CONFIG_PATH")]
    config_path: String,

    /// Public URL of this provider (the token issuer)
    #[arg(long, default_value = endpoints::IDP_URL, env = "IDP_PUBLIC_URL")]
    public_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_idp=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config_path)?;
    let store = ConfigurationStore::new(&cli.config_path)?;
    store.initialize()?;

    let credential = match &config.signing.key_path {
        Some(path) => SigningCredential::from_pem_file(path)?,
        None => SigningCredential::developer(&cli.config_path)?,
    };
    tracing::info!("Signing tokens with key {}", credential.key_id());

    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs.max(1));
    let state = Arc::new(AppState::new(config, store, credential, &cli.public_url));

    // Periodically drop expired codes, tokens and sessions
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            sweeper.grants.cleanup_expired();
        }
    });

    let app = router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting gallery-idp on {}", addr);
    tracing::info!("Issuer: {}", cli.public_url);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Identity provider shut down");
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
