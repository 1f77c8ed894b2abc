use crate::agent::LookupAgent;
use crate::config::AppConfig;
use crate::memory::MemoryManager;
use crate::session::SessionStore;
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Session store for working-set CRUD
    pub store: Arc<SessionStore>,
    /// Conversational agent driving /chat turns
    pub agent: Arc<LookupAgent>,
    /// Memory tiers for stats and retrieval endpoints
    pub memory: Arc<MemoryManager>,
    /// Loaded application configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &"Arc<SessionStore>")
            .field("agent", &"Arc<LookupAgent>")
            .field("memory", &"Arc<MemoryManager>")
            .field("config", &self.config.app_name)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        store: Arc<SessionStore>,
        agent: Arc<LookupAgent>,
        memory: Arc<MemoryManager>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            agent,
            memory,
            config,
        }
    }
}
