//! Aegis 审计网关
//!
//! 入口：初始化日志、加载配置、构建共享组件，启动 WebSocket 接入，Ctrl+C 退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use aegis::config::{load_config, AppConfig};
use aegis::gateway::{AuditHub, HubConfig};
use aegis::{observability, AuditComponents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选：第一个参数为额外配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let components = AuditComponents::from_config(&cfg)
        .await
        .context("Failed to build audit components")?;
    tracing::info!(
        "Starting {} ({})",
        cfg.app.name.as_deref().unwrap_or("aegis"),
        components.status_text()
    );
    let hub = AuditHub::new(HubConfig::from(&cfg.gateway), Arc::new(components));

    hub.start().await.map_err(anyhow::Error::msg)?;
    tracing::info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    tracing::info!(
        "Shutting down auditor ({} connection(s) still open)...",
        hub.connection_count()
    );
    hub.stop();

    Ok(())
}
