use anyhow::{Context, Result};
use delay_relay::{RelayConfig, RelayServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(RelayConfig::from_env().context("invalid relay configuration")?);
    let snapshot = config.snapshot();
    tracing::info!(
        local_port = snapshot.local_port,
        remote = %format!("{}:{}", snapshot.remote_host, snapshot.remote_port),
        delay_ms = snapshot.delay_ms,
        mode = %snapshot.state,
        passthrough = snapshot.passthrough,
        "delay-relay starting"
    );

    let server = RelayServer::new(config);
    server.start().await.context("failed to start relay server")?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    server.stop().await;

    Ok(())
}
