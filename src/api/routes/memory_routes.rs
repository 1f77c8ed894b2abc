//! Memory and liveness routes.

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::memory_handler::{health, memory_stats};

pub fn create_memory_router() -> Router<AppState> {
    Router::new()
        .route("/memory/stats", get(memory_stats))
        .route("/health", get(health))
}
