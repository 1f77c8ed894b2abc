//! Session routes.

use crate::api::handlers::session_handler::*;
use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::api::app_state::AppState;

pub fn create_session_router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/clear", post(clear_session))
        .route("/sessions/:id/items", post(add_item))
        .route("/sessions/:id/items/:key", delete(remove_item))
        .route("/sessions/:id/view", get(view_session))
}
