//! Aura Impact Server
//!
//! Verifies proof-of-impact submissions and credits Aura Points

use aura_impact::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Aura Impact Server");

    let config = Config::load()?;
    aura_impact::server::serve(config).await
}
