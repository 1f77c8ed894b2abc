//! Episodic memory: past turns retrieved by embedding similarity.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embeddings::{EmbeddingService, cosine_similarity};
use crate::error::Result;
use crate::models::{Episode, EpisodeMetadata, ScoredEpisode};

/// Episode store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicStats {
    /// Number of stored episodes
    pub total_episodes: usize,
}

/// Episode store backed by a JSON file
pub struct EpisodicMemory {
    episodes: RwLock<Vec<Episode>>,
    storage_file: PathBuf,
    embedder: Arc<dyn EmbeddingService>,
}

impl EpisodicMemory {
    /// Open the store, loading any persisted episodes. A malformed file
    /// is logged and treated as empty.
    pub fn new(storage_file: PathBuf, embedder: Arc<dyn EmbeddingService>) -> Self {
        let episodes = match fs::read_to_string(&storage_file) {
            Ok(raw) => match serde_json::from_str::<Vec<Episode>>(&raw) {
                Ok(episodes) => episodes,
                Err(e) => {
                    warn!(file = %storage_file.display(), error = %e, "malformed episodes file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        info!(count = episodes.len(), "episodic memory loaded");
        Self {
            episodes: RwLock::new(episodes),
            storage_file,
            embedder,
        }
    }

    /// Store one completed turn. The embedding is computed before the
    /// store lock is taken.
    pub async fn add_turn(
        &self,
        turn_id: &str,
        user_query: &str,
        assistant_response: &str,
        metadata: EpisodeMetadata,
    ) -> Result<()> {
        let text = Episode::format_turn(user_query, assistant_response);
        let embedding = self.embedder.embed(&text).await?;

        {
            let mut episodes = self.episodes.write();
            episodes.push(Episode {
                id: turn_id.to_string(),
                text,
                embedding,
                metadata,
            });
        }
        self.save()?;
        debug!(turn_id, "stored conversation turn");
        Ok(())
    }

    /// Most similar past episodes for a query, best first
    pub async fn search_similar(&self, query: &str, n_results: usize) -> Result<Vec<ScoredEpisode>> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<ScoredEpisode> = {
            let episodes = self.episodes.read();
            episodes
                .iter()
                .map(|episode| ScoredEpisode {
                    similarity: cosine_similarity(&query_embedding, &episode.embedding),
                    episode: episode.clone(),
                })
                .collect()
        };

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(n_results);
        Ok(scored)
    }

    /// Most recent episodes, newest first
    pub fn recent(&self, n_results: usize) -> Vec<Episode> {
        let episodes = self.episodes.read();
        let mut recent: Vec<Episode> = episodes.clone();
        recent.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        recent.truncate(n_results);
        recent
    }

    /// Delete one episode by id
    pub fn delete(&self, episode_id: &str) -> Result<bool> {
        let removed = {
            let mut episodes = self.episodes.write();
            let before = episodes.len();
            episodes.retain(|e| e.id != episode_id);
            episodes.len() < before
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Drop every episode
    pub fn clear_all(&self) -> Result<()> {
        self.episodes.write().clear();
        self.save()
    }

    /// Store statistics
    pub fn stats(&self) -> EpisodicStats {
        EpisodicStats {
            total_episodes: self.episodes.read().len(),
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.storage_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = self.episodes.read().clone();
        let raw = serde_json::to_string(&snapshot)?;
        fs::write(&self.storage_file, raw)?;
        Ok(())
    }
}
