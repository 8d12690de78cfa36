use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use supportdesk::core::config::AppConfig;
use supportdesk::core::shared::state::AppState;
use supportdesk::main_module::run_server;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        "Starting supportdesk {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let state = Arc::new(
        AppState::from_config(config)
            .await
            .context("Failed to initialize application state")?,
    );

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sessions.cleanup_expired_sessions().await {
                warn!("Session cleanup failed: {e}");
            }
        }
    });

    run_server(state).await.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}
