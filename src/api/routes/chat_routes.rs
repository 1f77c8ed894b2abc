//! Chat routes.

use axum::{Router, routing::post};

use crate::api::app_state::AppState;
use crate::api::handlers::chat_handler::chat;

pub fn create_chat_router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}
