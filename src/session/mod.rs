//! Session registry.
//!
//! Explicit store object handed to request handlers by `Arc`, replacing
//! any ambient global. Each session sits behind its own mutex so
//! concurrent turns for the same id serialize while cross-session
//! operations stay independent.
//!
//! Lookup-miss operations return neutral values rather than errors: the
//! UI-facing session API never throws for "not found".

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{DataItem, ItemType, SessionContext, SessionStats};

/// In-memory session registry
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionContext>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create (or replace) a session. Calling twice for the same id
    /// discards prior data.
    pub fn start_session(&self, session_id: &str) {
        self.sessions.insert(
            session_id.to_string(),
            Arc::new(Mutex::new(SessionContext::new(session_id))),
        );
        info!(session_id, "started interactive session");
    }

    /// Create the session only if it does not exist yet
    pub fn ensure_session(&self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionContext::new(session_id))));
    }

    /// Snapshot of a session's state, if it exists
    pub fn get_context(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().lock().clone())
    }

    /// Run a closure under the session's lock. Returns `None` when the
    /// session is unknown.
    pub fn with_context<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionContext) -> T,
    ) -> Option<T> {
        let entry = self.sessions.get(session_id)?;
        let handle = Arc::clone(entry.value());
        drop(entry);
        let mut ctx = handle.lock();
        Some(f(&mut ctx))
    }

    /// Insert or overwrite an item by key; false only when the session
    /// id is unknown.
    pub fn add_data_item(&self, session_id: &str, item: DataItem) -> bool {
        self.with_context(session_id, |ctx| {
            debug!(session_id, key = %item.key, item_type = %item.item_type, "adding data item");
            ctx.insert(item);
        })
        .is_some()
    }

    /// Remove an item by key; whether anything was removed
    pub fn remove_data_item(&self, session_id: &str, key: &str) -> bool {
        self.with_context(session_id, |ctx| ctx.remove(key))
            .unwrap_or(false)
    }

    /// Empty a session's working set, keeping the session alive
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.with_context(session_id, |ctx| {
            ctx.clear();
            info!(session_id, "cleared session data");
        })
        .is_some()
    }

    /// All items of a given type
    pub fn get_data_by_type(&self, session_id: &str, item_type: &ItemType) -> Vec<DataItem> {
        self.with_context(session_id, |ctx| ctx.items_of_type(item_type))
            .unwrap_or_default()
    }

    /// Append a raw user input to the session's history
    pub fn record_query(&self, session_id: &str, query: &str) {
        self.with_context(session_id, |ctx| ctx.record_query(query));
    }

    /// Counts by item type plus totals
    pub fn stats(&self, session_id: &str) -> Option<SessionStats> {
        self.with_context(session_id, |ctx| ctx.stats())
    }

    /// Destroy a session entirely
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle longer than `max_idle_secs`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, max_idle_secs: u64) -> usize {
        let cutoff = Utc::now() - Duration::seconds(max_idle_secs as i64);
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().lock().last_active_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in &stale {
            self.sessions.remove(session_id);
            info!(%session_id, "evicted idle session");
        }
        stale.len()
    }
}

/// Create a shared session store
pub fn create_session_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new())
}
