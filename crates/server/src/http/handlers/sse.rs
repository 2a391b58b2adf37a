use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};

use crate::http::extract::PathArg;
use crate::state::AppState;

/// Joins the article's room for as long as the client stays connected.
pub async fn room_events(
    State(state): State<AppState>,
    PathArg(article_id): PathArg<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.rooms.join(&article_id);
    tracing::info!(
        "SSE connected: room={} subscribers={}",
        subscription.room(),
        state.rooms.subscriber_count(&article_id)
    );

    let stream = subscription.map(|event| {
        Event::default()
            .event(event.kind.as_str())
            .json_data(&event.comment)
            .map_err(|e| {
                tracing::error!("SSE serialization error: {}", e);
                axum::Error::new(e)
            })
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
