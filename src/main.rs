//! Sleuth - 多智能体数据编排系统
//!
//! 入口：初始化日志与配置，注册外部智能体，启动 WebSocket 网关与 HTTP API。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sleuth::agents::{AgentRegistry, AgentRunner};
use sleuth::artifacts::{ArtifactStore, LlmArtifactBuilder};
use sleuth::config::load_config;
use sleuth::gateway::{self, GatewayHub, HttpState, SessionManager};
use sleuth::llm::OpenAiClient;
use sleuth::memory::HistoryStore;
use sleuth::orchestrate::{PlanExecutor, PlanGenerator, SessionOrchestrator, Verifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let config = load_config(None).context("Failed to load configuration")?;

    let llm: Arc<dyn sleuth::llm::LlmClient> = Arc::new(OpenAiClient::new(
        config.llm.base_url.as_deref(),
        &config.llm.model,
        config.llm.api_key.as_deref(),
    ));

    let registry = Arc::new(AgentRegistry::bootstrap(&config.agents).await);
    if registry.is_empty() {
        tracing::warn!("no agents registered, plans will be limited to the dashboard builder");
    } else {
        tracing::info!(agents = registry.len(), "agent registry ready");
    }

    let data_dir = config
        .app
        .data_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("./data"));
    let history = Arc::new(HistoryStore::new(&data_dir).context("Failed to open history store")?);

    let artifacts_root = config
        .artifacts
        .root_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let store = Arc::new(ArtifactStore::new(&artifacts_root).context("Failed to open artifact store")?);
    let builder: Arc<dyn sleuth::artifacts::ArtifactBuilder> = Arc::new(LlmArtifactBuilder::new(
        Arc::clone(&llm),
        Arc::clone(&store),
    ));

    let runner = Arc::new(AgentRunner::new(
        Arc::clone(&llm),
        Arc::clone(&registry),
        config.orchestrator.max_agent_steps,
    ));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        PlanGenerator::new(Arc::clone(&llm), Arc::clone(&registry)),
        PlanExecutor::new(runner, Arc::clone(&registry), Arc::clone(&builder)),
        Verifier::new(Arc::clone(&llm), Arc::clone(&registry)),
        Arc::clone(&builder),
        Arc::clone(&history),
        config.orchestrator.max_iterations,
    ));

    let session_manager = Arc::new(SessionManager::new(
        Arc::clone(&history),
        config.app.max_context_turns,
        config.gateway.session_timeout_secs,
    ));

    let hub = GatewayHub::new(
        config.gateway.ws_addr.clone(),
        session_manager,
        orchestrator,
        builder,
    );
    hub.start().await.map_err(anyhow::Error::msg)?;

    let http_state = Arc::new(HttpState {
        store,
        registry,
    });
    gateway::http::serve(config.gateway.http_addr.clone(), http_state)
        .await
        .map_err(anyhow::Error::msg)?;

    Ok(())
}
