use anyhow::Result;
use clap::Parser;
use meshcall_relay::RelayConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::parse();
    config.validate()?;

    info!("Initializing signaling relay...");
    meshcall_relay::run(config).await
}
