use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{api_state::ApiState, error::ApiError};

/// Philosopher collections a question can target.
pub async fn list_collections(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let collections = state.pipeline.philosopher_collections().await?;

    Ok(Json(json!({ "collections": collections })))
}
