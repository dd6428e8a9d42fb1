use std::sync::Arc;

use crate::config::Config;
use crate::services::RegistryCore;

pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // 初始化注册中心核心
    let core = Arc::new(RegistryCore::new(config));
    core.start();

    tracing::info!(
        health_threshold_secs = core.settings().registry.health_threshold_secs,
        sweep_interval_secs = core.settings().registry.sweep_interval_secs,
        "Registry center started"
    );

    // 接入层由外部挂载，这里只负责生命周期
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    core.shutdown().await;
    Ok(())
}
