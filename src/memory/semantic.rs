//! Semantic memory: extracted facts with flat-JSON persistence.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Confidence, Fact, FactType};

/// Fact store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticStats {
    /// Number of stored facts
    pub total_facts: usize,
    /// Counts per fact type tag
    pub by_type: HashMap<String, usize>,
}

/// Fact store backed by a JSON file
pub struct SemanticMemory {
    facts: RwLock<HashMap<String, Fact>>,
    storage_file: PathBuf,
}

impl SemanticMemory {
    /// Open the store, loading any persisted facts. A malformed file is
    /// logged and treated as empty.
    pub fn new(storage_file: PathBuf) -> Self {
        let facts = match fs::read_to_string(&storage_file) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, Fact>>(&raw) {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(file = %storage_file.display(), error = %e, "malformed facts file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        info!(count = facts.len(), "semantic memory loaded");
        Self {
            facts: RwLock::new(facts),
            storage_file,
        }
    }

    /// Store a fact, returning its id
    pub fn add_fact(&self, fact: Fact) -> Result<String> {
        let id = fact.id.clone();
        debug!(id = %id, content = %fact.content, "adding fact");
        {
            let mut facts = self.facts.write();
            facts.insert(id.clone(), fact);
        }
        self.save()?;
        Ok(id)
    }

    /// Search facts by content substring, entity overlap, and minimum
    /// confidence. Matches get their access bookkeeping updated (the one
    /// deliberate non-pure read) and come back ordered by confidence
    /// then access count, both descending.
    pub fn search_facts(
        &self,
        query: Option<&str>,
        entities: &[String],
        min_confidence: Option<Confidence>,
    ) -> Vec<Fact> {
        let query_lower = query.map(str::to_lowercase);
        let entities_lower: Vec<String> = entities.iter().map(|e| e.to_lowercase()).collect();

        let mut matches = Vec::new();
        {
            let mut facts = self.facts.write();
            for fact in facts.values_mut() {
                if let Some(min) = min_confidence {
                    if fact.confidence < min {
                        continue;
                    }
                }
                if !entities_lower.is_empty() {
                    let fact_entities: Vec<String> =
                        fact.entities.iter().map(|e| e.to_lowercase()).collect();
                    if !entities_lower.iter().any(|e| fact_entities.contains(e)) {
                        continue;
                    }
                }
                if let Some(query) = &query_lower {
                    if !fact.content.to_lowercase().contains(query) {
                        continue;
                    }
                }

                fact.mark_accessed();
                matches.push(fact.clone());
            }
        }

        matches.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then(b.access_count.cmp(&a.access_count))
        });

        if !matches.is_empty() {
            if let Err(e) = self.save() {
                warn!(error = %e, "failed to persist fact access counts");
            }
        }
        matches
    }

    /// All facts, optionally filtered by type
    pub fn all_facts(&self, fact_type: Option<FactType>) -> Vec<Fact> {
        let facts = self.facts.read();
        facts
            .values()
            .filter(|fact| fact_type.is_none_or(|t| fact.fact_type == t))
            .cloned()
            .collect()
    }

    /// Delete a fact by id
    pub fn delete_fact(&self, fact_id: &str) -> Result<bool> {
        let removed = self.facts.write().remove(fact_id).is_some();
        if removed {
            debug!(id = fact_id, "deleted fact");
            self.save()?;
        }
        Ok(removed)
    }

    /// Drop every fact
    pub fn clear(&self) -> Result<()> {
        self.facts.write().clear();
        self.save()
    }

    /// Store statistics
    pub fn stats(&self) -> SemanticStats {
        let facts = self.facts.read();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        for fact in facts.values() {
            *by_type.entry(fact.fact_type.to_string()).or_default() += 1;
        }
        SemanticStats {
            total_facts: facts.len(),
            by_type,
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.storage_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = self.facts.read().clone();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.storage_file, raw)?;
        Ok(())
    }
}
