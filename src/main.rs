use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use peerlearn::config::AppConfig;
use peerlearn::llm_client::{CompletionBackend, LlmClient};
use peerlearn::log_store::LogStore;
use peerlearn::pipeline::TurnPipeline;
use peerlearn::prompt::PromptAssembler;
use peerlearn::server::{self, AppState};
use peerlearn::session::SessionStore;
use peerlearn::tools::reference::ReferenceLibrary;
use peerlearn::tools::ToolRegistry;
use peerlearn::users::UserRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,peerlearn=debug")),
        )
        .init();

    tracing::info!("peerlearn backend starting...");

    let config = AppConfig::load();

    let prompts = Arc::new(PromptAssembler::new(&config.prompts_dir).assemble());
    let registry = Arc::new(UserRegistry::load(Path::new(&config.users_file)));
    if registry.is_empty() {
        tracing::warn!("User registry is empty; no participant can log in");
    }

    let library = ReferenceLibrary::load(config.reference_file.as_deref().map(Path::new));
    let tools = Arc::new(ToolRegistry::new(library));

    // A missing key surfaces per turn as BackendUnavailable instead of
    // refusing to start, so operators can still reach /health.
    let backend: Option<Arc<dyn CompletionBackend>> = if config.llm.api_key.is_some() {
        Some(Arc::new(LlmClient::new(&config.llm)?))
    } else {
        tracing::error!("No LLM API key configured; turns will fail until one is provided");
        None
    };

    let sessions = Arc::new(SessionStore::new());
    let log_store = Arc::new(LogStore::new(&config.logs_dir));

    let pipeline = Arc::new(TurnPipeline::new(
        backend,
        tools,
        prompts.system_context.clone(),
        sessions.clone(),
        log_store.clone(),
        config.max_tool_rounds,
    ));

    let state = AppState {
        registry,
        prompts,
        sessions,
        log_store,
        pipeline,
    };

    server::serve(state, &config.bind_addr).await
}
