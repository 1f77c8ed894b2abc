//! Chat turn request and response payloads.

use serde::{Deserialize, Serialize};

use crate::models::{SessionStats, SourceRecord};

/// One conversational turn request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Session to run the turn against; generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
    /// The user's message
    pub message: String,
}

/// Agent turn response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    /// User-facing reply text
    pub reply: String,
    /// Records retrieved this turn
    pub data: Vec<SourceRecord>,
    pub session_stats: Option<SessionStats>,
    /// Degraded-path explanation, when a collaborator failed
    pub error: Option<String>,
}
