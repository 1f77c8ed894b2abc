//! Session request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Create session request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    /// Caller-supplied identifier; generated when absent
    pub session_id: Option<String>,
}

/// Create session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Session statistics response
#[derive(Debug, Serialize)]
pub struct SessionStatsResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub total_items: usize,
    /// Item counts keyed by type tag
    pub item_types: HashMap<String, usize>,
    pub queries_processed: usize,
    pub modifications_made: usize,
}

/// Clear session response
#[derive(Debug, Serialize)]
pub struct ClearSessionResponse {
    pub session_id: String,
    pub cleared: bool,
}

/// Add item request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    /// Canonical type tag, e.g. "icd_code"
    pub item_type: String,
    pub key: String,
    pub value: String,
    /// Query that produced the item; defaults to "api"
    #[serde(default)]
    pub source_query: Option<String>,
}

/// Add item response
#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    pub session_id: String,
    pub key: String,
    pub total_items: usize,
}

/// Remove item response
#[derive(Debug, Serialize)]
pub struct RemoveItemResponse {
    pub session_id: String,
    pub key: String,
    pub removed: bool,
}

/// View query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ViewParams {
    /// One of "json", "table", "summary"; defaults to "summary"
    pub format: Option<String>,
}

/// Rendered session view
#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub session_id: String,
    pub format: String,
    pub content: String,
}
