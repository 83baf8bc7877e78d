use axum::{extract::State, Json};
use retrieval_pipeline::{HybridQuery, HybridResponse};

use crate::{api_state::ApiState, error::ApiError};

pub async fn query_hybrid(
    State(state): State<ApiState>,
    Json(query): Json<HybridQuery>,
) -> Result<Json<HybridResponse>, ApiError> {
    Ok(Json(state.pipeline.query_hybrid(query).await?))
}
