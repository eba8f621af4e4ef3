use anyhow::Context;

use fleetpay_worker::{WorkerConfig, build_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fleetpay_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    let worker = build_worker(&config).await?;
    let running = worker.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested; waiting for in-flight sweeps");

    running.shutdown().await;
    Ok(())
}
