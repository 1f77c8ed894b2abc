use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    api::{app_state::AppState, dto::session_dto::*},
    error::AppError,
    format,
    models::{DataItem, ItemType},
};

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(%session_id, "creating session");

    state.store.start_session(&session_id);
    let context = state
        .store
        .get_context(&session_id)
        .ok_or_else(|| AppError::Internal("session missing after start".to_string()))?;

    let response = CreateSessionResponse {
        session_id,
        created_at: context.created_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!(session_id = %id, "getting session stats");

    let stats = state
        .store
        .stats(&id)
        .ok_or_else(|| AppError::NotFound(format!("session not found: {id}")))?;

    Ok(Json(SessionStatsResponse {
        session_id: stats.session_id,
        created_at: stats.created_at,
        total_items: stats.total_items,
        item_types: stats.item_types,
        queries_processed: stats.queries_processed,
        modifications_made: stats.modifications_made,
    }))
}

pub async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!(session_id = %id, "clearing session");

    if !state.store.clear_session(&id) {
        return Err(AppError::NotFound(format!("session not found: {id}")));
    }
    Ok(Json(ClearSessionResponse {
        session_id: id,
        cleared: true,
    }))
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.key.is_empty() {
        return Err(AppError::Validation("item key must not be empty".to_string()));
    }
    debug!(session_id = %id, key = %request.key, "adding item");

    let item = DataItem::new(
        ItemType::from_tag(&request.item_type),
        &request.key,
        &request.value,
        request.source_query.as_deref().unwrap_or("api"),
    );
    state.store.ensure_session(&id);
    state.store.add_data_item(&id, item);

    let total_items = state.store.stats(&id).map(|s| s.total_items).unwrap_or(0);
    let response = AddItemResponse {
        session_id: id,
        key: request.key,
        total_items,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    debug!(session_id = %id, key = %key, "removing item");

    if state.store.get_context(&id).is_none() {
        return Err(AppError::NotFound(format!("session not found: {id}")));
    }
    let removed = state.store.remove_data_item(&id, &key);

    Ok(Json(RemoveItemResponse {
        session_id: id,
        key,
        removed,
    }))
}

/// Render the session in the requested format. Unknown sessions get the
/// formatter's neutral bodies rather than a 404, matching the
/// conversational surface.
pub async fn view_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse, AppError> {
    let format_name = params.format.as_deref().unwrap_or("summary");
    debug!(session_id = %id, format = format_name, "rendering session view");

    let context = state.store.get_context(&id);
    let content = match format_name {
        "json" => format::as_json(context.as_ref())?,
        "table" => format::as_table(context.as_ref()),
        "summary" => format::as_summary(context.as_ref()),
        other => {
            return Err(AppError::Validation(format!(
                "unknown format '{other}', expected json, table, or summary"
            )));
        }
    };

    Ok(Json(ViewResponse {
        session_id: id,
        format: format_name.to_string(),
        content,
    }))
}
