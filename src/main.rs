//! Relay 网关入口：加载配置、初始化日志，启动 WebSocket 网关与诊断接口，Ctrl-C 退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use relay::config::load_config;
use relay::gateway::{diagnostics, Hub, HubConfig, Orchestrator, SessionRegistry};
use relay::llm::create_llm_client;
use relay::observability;
use relay::tools::create_tool_executor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;

    let registry = Arc::new(SessionRegistry::new());
    let llm = create_llm_client(&cfg.llm);
    let executor = Arc::new(create_tool_executor(&cfg.tools));
    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        llm,
        Arc::clone(&executor),
        cfg.app.system_prompt(),
        cfg.app.welcome_message.clone(),
    );

    let hub = Hub::new(HubConfig::from_app(&cfg.app), orchestrator);
    hub.start().await.context("Failed to start gateway")?;

    let listener = tokio::net::TcpListener::bind(&cfg.app.diagnostics_addr)
        .await
        .with_context(|| format!("Failed to bind diagnostics on {}", cfg.app.diagnostics_addr))?;
    tracing::info!("Diagnostics listening on http://{}", cfg.app.diagnostics_addr);
    let app = diagnostics::create_router(registry, executor);
    let diagnostics_server = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    hub.stop();
    diagnostics_server.abort();

    Ok(())
}
