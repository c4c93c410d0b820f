use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast;

use crate::api::ApiState;
use crate::sync::remote::{CollectionKind, SnapshotMap};

/// SSE endpoint: one `snapshot` event with the full current map immediately
/// on connect, then one per change. Subscribers that lag simply wait for
/// the next event, since every event carries complete state.
pub async fn subscribe_to_collection(
    State(state): State<ApiState>,
    Path((uid, name)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let kind = CollectionKind::from_name(&name).ok_or(StatusCode::NOT_FOUND)?;
    let key = (uid, kind);

    let mut rx = state.hub.subscribe(&key).await;
    let initial = state.hub.snapshot(&key).await;

    let stream = async_stream::stream! {
        yield Ok(snapshot_event(&initial));
        loop {
            match rx.recv().await {
                Ok(snapshot) => yield Ok(snapshot_event(&snapshot)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn snapshot_event(snapshot: &SnapshotMap) -> Event {
    let data = serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("snapshot").data(data)
}
