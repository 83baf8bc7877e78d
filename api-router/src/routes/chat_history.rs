use axum::{
    extract::{Path, Query, State},
    Json,
};
use common::storage::{chat_store::ChatStore, types::chat_message::StoredMessage};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

const MAX_PAGE_SIZE: usize = 200;

const fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<StoredMessage>,
}

/// Stored messages of a session, newest first.
pub async fn get_chat_history(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = state
        .db
        .get_conversation_history(
            &session_id,
            params.limit.clamp(1, MAX_PAGE_SIZE),
            params.offset,
            None,
            None,
        )
        .await?;

    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

pub async fn delete_chat_history(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.db.delete_session_messages(&session_id).await?;
    info!(%session_id, deleted, "Deleted chat history");

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "deleted": deleted
    })))
}
