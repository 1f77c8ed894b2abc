//! Memory and health payloads.

use serde::Serialize;

use crate::memory::MemoryStats;

/// Memory tier statistics response
#[derive(Debug, Serialize)]
pub struct MemoryStatsResponse {
    #[serde(flatten)]
    pub stats: MemoryStats,
}

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub active_sessions: usize,
}
