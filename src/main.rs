use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};

use unimind::{
    api::server::ApiServer, auth::Authenticator, bus::EventBus, config::Config,
    latency::Latency, manager::SessionCore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // Not fatal, the environment may already be set
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("UNIMIND session core starting...");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        bind = %config.bind_address,
        matching_ms = config.latency.matching.as_millis() as u64,
        reply_min_ms = config.latency.reply_min.as_millis() as u64,
        "Configuration loaded"
    );

    let bus = Arc::new(EventBus::with_capacity(config.event_capacity));
    let latency: Arc<dyn Latency> = Arc::new(config.latency.clone());

    let core = SessionCore::new(bus.clone(), latency.clone());
    let auth = Arc::new(Authenticator::new(latency, bus));

    let app = ApiServer::new(core, auth).router();

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
