use axum::{extract::State, Extension, Json};
use retrieval_pipeline::{AskRequest, AskResponse};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_identity::Identity};

pub async fn ask_philosophy(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(mut request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    info!(collection = %request.collection, "Received question");
    request.username = identity.username;

    let response = state.pipeline.answer(request).await?;

    Ok(Json(response))
}
