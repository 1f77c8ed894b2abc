use medcodex::agent::LookupAgent;
use medcodex::api::{self, app_state::AppState};
use medcodex::config::{AppConfig, ConfigLoader};
use medcodex::llm::create_chat_service;
use medcodex::memory::{
    ContextBuilder, EpisodicMemory, MemoryManager, SemanticMemory, TokenCounter,
    create_embedding_service,
};
use medcodex::models::ConversationHistory;
use medcodex::search::create_code_search_service;
use medcodex::session::{SessionStore, create_session_store};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load()?;
    init_tracing(&config);
    info!(app = %config.app_name, env = %config.environment, "configuration loaded");

    ConfigLoader::validate(&config)?;

    let store = create_session_store();
    info!("session store initialized");

    let search = create_code_search_service(&config)?;
    info!(index = %config.search.index, "code search service initialized");

    let llm = create_chat_service(&config)?;
    info!(model = %config.llm.model, "chat completion service initialized");

    let embeddings = create_embedding_service(&config)?;
    info!(
        backend = %config.embedding.backend,
        dimension = config.embedding.dimension,
        "embedding service initialized"
    );

    let data_dir = &config.memory.data_dir;
    let semantic = Arc::new(SemanticMemory::new(data_dir.join("facts.json")));
    let episodic = Arc::new(EpisodicMemory::new(data_dir.join("episodes.json"), embeddings));
    let counter = Arc::new(TokenCounter::new(config.memory.tokenizer_file.as_deref()));
    let builder = ContextBuilder::new(
        Arc::clone(&semantic),
        Arc::clone(&episodic),
        counter,
        config.memory.max_context_tokens,
    );
    let memory = Arc::new(MemoryManager::new(
        semantic,
        episodic,
        builder,
        Arc::clone(&llm),
        config.memory.fact_extraction_interval,
    ));
    info!("memory tiers initialized");

    let mut history = ConversationHistory::new(
        config.memory.max_messages,
        data_dir.join("history.json"),
    );
    if history.load_from_disk() {
        info!("conversation history restored from disk");
    }
    let history = Arc::new(Mutex::new(history));

    let agent = Arc::new(LookupAgent::new(
        Arc::clone(&store),
        search,
        llm,
        Arc::clone(&memory),
        history,
        config.search.top,
    ));
    info!("lookup agent initialized");

    spawn_idle_sweeper(
        Arc::clone(&store),
        config.session.idle_timeout,
        config.session.sweep_interval,
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(store, agent, memory, Arc::new(config));
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Periodically drop sessions idle past the configured timeout.
/// A zero interval or timeout disables the sweeper.
fn spawn_idle_sweeper(store: Arc<SessionStore>, idle_timeout: u64, sweep_interval: u64) {
    if idle_timeout == 0 || sweep_interval == 0 {
        info!("idle session sweeper disabled");
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(idle_timeout);
            if evicted > 0 {
                info!(evicted, "evicted idle sessions");
            } else {
                debug!("idle sweep found no stale sessions");
            }
        }
    });
}
