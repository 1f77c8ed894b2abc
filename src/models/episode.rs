//! Episodic memory models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a stored conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    /// Session the turn belongs to
    pub session_id: String,
    /// When the turn happened
    pub timestamp: DateTime<Utc>,
    /// Running turn number across the process lifetime
    pub turn_number: u64,
}

/// One stored (user query, assistant response) pair.
///
/// Episodes are retrieved by similarity only and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Generated turn id
    pub id: String,
    /// Turn text formatted as "User: ...\nAssistant: ..."
    pub text: String,
    /// Embedding of `text`
    pub embedding: Vec<f32>,
    /// Turn provenance
    pub metadata: EpisodeMetadata,
}

impl Episode {
    /// Format a turn the way episodes are stored and matched
    pub fn format_turn(user_query: &str, assistant_response: &str) -> String {
        format!("User: {user_query}\nAssistant: {assistant_response}")
    }
}

/// An episode with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: Episode,
    /// Cosine similarity in [0, 1]
    pub similarity: f32,
}
