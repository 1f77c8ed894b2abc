use axum::{Json, extract::State, response::IntoResponse};

use crate::api::{app_state::AppState, dto::memory_dto::*};
use crate::error::AppError;

pub async fn memory_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.memory.stats();
    Ok(Json(MemoryStatsResponse { stats }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: state.config.app_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.store.session_count(),
    })
}
