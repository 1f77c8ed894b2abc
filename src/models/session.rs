//! Session context model.
//!
//! A `SessionContext` holds the mutable working data set of one
//! interactive session: items keyed by code, the raw query history, and
//! an append-only audit log of modifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::data_item::{DataItem, ItemType};

/// Audit log cap. The log is diagnostic only and never read back for
/// logic; oldest entries are dropped past this size.
pub const MAX_MODIFICATION_RECORDS: usize = 1000;

/// Kind of session mutation recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationAction {
    Add,
    Remove,
    ClearAll,
}

/// One audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationRecord {
    /// What happened
    pub action: ModificationAction,
    /// Type tag of the affected item, when applicable
    pub item_type: Option<ItemType>,
    /// Key of the affected item, when applicable
    pub key: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// State of one interactive session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Caller-supplied opaque identifier
    pub session_id: String,
    /// Working data set, keyed by item key
    data: HashMap<String, DataItem>,
    /// Insertion order of keys, for stable table rendering. Re-adding an
    /// existing key keeps its original position.
    insertion_order: Vec<String>,
    /// Raw user inputs processed in this session
    pub query_history: Vec<String>,
    /// Append-only audit trail
    pub modifications: Vec<ModificationRecord>,
    /// Session start time
    pub created_at: DateTime<Utc>,
    /// Last touch time, used by idle eviction
    pub last_active_at: DateTime<Utc>,
}

impl SessionContext {
    /// Create an empty session
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            data: HashMap::new(),
            insertion_order: Vec::new(),
            query_history: Vec::new(),
            modifications: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Insert or overwrite an item by key and record the mutation
    pub fn insert(&mut self, item: DataItem) {
        self.record(ModificationAction::Add, Some(item.item_type.clone()), Some(&item.key));
        if !self.data.contains_key(&item.key) {
            self.insertion_order.push(item.key.clone());
        }
        self.data.insert(item.key.clone(), item);
        self.touch();
    }

    /// Remove an item by key; returns whether anything was removed
    pub fn remove(&mut self, key: &str) -> bool {
        match self.data.remove(key) {
            Some(item) => {
                self.insertion_order.retain(|k| k != key);
                self.record(ModificationAction::Remove, Some(item.item_type), Some(key));
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Drop all items and record the wipe
    pub fn clear(&mut self) {
        self.data.clear();
        self.insertion_order.clear();
        self.record(ModificationAction::ClearAll, None, None);
        self.touch();
    }

    /// Look up an item by key
    pub fn get(&self, key: &str) -> Option<&DataItem> {
        self.data.get(key)
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the working set is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Items in insertion order
    pub fn items(&self) -> impl Iterator<Item = &DataItem> {
        self.insertion_order.iter().filter_map(|k| self.data.get(k))
    }

    /// All items of a given type, in insertion order
    pub fn items_of_type(&self, item_type: &ItemType) -> Vec<DataItem> {
        self.items()
            .filter(|item| &item.item_type == item_type)
            .cloned()
            .collect()
    }

    /// Keys currently held, in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.insertion_order.clone()
    }

    /// Append a raw user input to the history
    pub fn record_query(&mut self, query: &str) {
        self.query_history.push(query.to_string());
        self.touch();
    }

    /// Refresh the idle-eviction clock
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    fn record(&mut self, action: ModificationAction, item_type: Option<ItemType>, key: Option<&str>) {
        self.modifications.push(ModificationRecord {
            action,
            item_type,
            key: key.map(str::to_string),
            timestamp: Utc::now(),
        });
        if self.modifications.len() > MAX_MODIFICATION_RECORDS {
            let excess = self.modifications.len() - MAX_MODIFICATION_RECORDS;
            self.modifications.drain(..excess);
        }
    }

    /// Counts by type tag plus totals
    pub fn stats(&self) -> SessionStats {
        let mut item_types: HashMap<String, usize> = HashMap::new();
        for item in self.data.values() {
            *item_types.entry(item.item_type.tag().to_string()).or_insert(0) += 1;
        }
        SessionStats {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            total_items: self.data.len(),
            item_types,
            queries_processed: self.query_history.len(),
            modifications_made: self.modifications.len(),
        }
    }
}

/// Session statistics surfaced to UI layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub total_items: usize,
    pub item_types: HashMap<String, usize>,
    pub queries_processed: usize,
    pub modifications_made: usize,
}
