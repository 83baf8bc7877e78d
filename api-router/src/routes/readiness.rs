use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if SurrealDB and the vector store answer, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let db = state.db.client.query("RETURN true").await.map(|_| ());
    let vector = state.search.list_collections().await.map(|_| ());

    let check = |result: &Result<(), String>| if result.is_ok() { "ok" } else { "fail" };
    let db = db.map_err(|e| e.to_string());
    let vector = vector.map_err(|e| e.to_string());

    let reasons: Vec<String> = [&db, &vector]
        .into_iter()
        .filter_map(|result| result.as_ref().err().cloned())
        .collect();

    if reasons.is_empty() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok", "vector_store": "ok" }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": check(&db), "vector_store": check(&vector) },
                "reason": reasons.join("; ")
            })),
        )
    }
}
