use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use middleware_identity::attach_identity;
use routes::{
    ask::ask_philosophy,
    ask_stream::ask_philosophy_stream,
    chat_history::{delete_chat_history, get_chat_history},
    collections::list_collections,
    liveness::live,
    query_hybrid::query_hybrid,
    readiness::ready,
};

pub mod api_state;
pub mod error;
pub mod middleware_identity;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Question answering; the caller's username comes from the upstream auth layer
    let answering = Router::new()
        .route("/ask_philosophy", post(ask_philosophy))
        .route("/ask_philosophy/stream", post(ask_philosophy_stream))
        .route("/query_hybrid", post(query_hybrid))
        .route("/collections", get(list_collections))
        .route(
            "/chat_history/{session_id}",
            get(get_chat_history).delete(delete_chat_history),
        )
        .route_layer(from_fn(attach_identity));

    public.merge(answering)
}
