use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    Extension, Json,
};
use futures::{Stream, StreamExt};
use retrieval_pipeline::{AnswerStream, AskRequest};
use serde_json::json;
use tracing::{error, info};

use crate::{api_state::ApiState, error::ApiError, middleware_identity::Identity};

fn event(name: &str, data: impl AsRef<str>) -> Result<Event, Infallible> {
    Ok(Event::default().event(name).data(data))
}

/// Streams the answer as `chunk` events followed by a `done` event carrying
/// the collection, window size and sources. A failure mid-stream ends it with
/// an `error` event.
pub async fn ask_philosophy_stream(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Json(mut request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    info!(collection = %request.collection, "Received streaming question");
    request.username = identity.username;

    let AnswerStream {
        collection,
        decision,
        sources,
        mut chunks,
    } = state.pipeline.answer_stream(request).await?;

    let events = stream! {
        while let Some(item) = chunks.next().await {
            match item {
                Ok(text) => yield event("chunk", text),
                Err(err) => {
                    error!(error = %err, "Answer stream failed");
                    yield event("error", "The answer could not be completed");
                    return;
                }
            }
        }

        let summary = json!({
            "collection": collection,
            "context_window": decision.window_size,
            "rationale": decision.rationale,
            "sources": sources,
        });
        yield event("done", summary.to_string());
    };

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
