use axum::{Json, extract::State, response::IntoResponse};
use tracing::debug;
use uuid::Uuid;

use crate::{
    api::{app_state::AppState, dto::chat_dto::*},
    error::AppError,
};

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(%session_id, "processing chat turn");

    let reply = state.agent.handle_turn(&session_id, &request.message).await;

    Ok(Json(ChatResponse {
        session_id,
        reply: reply.text,
        data: reply.data,
        session_stats: reply.session_stats,
        error: reply.error,
    }))
}
