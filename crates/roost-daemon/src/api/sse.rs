//! Server-Sent Events stream over the event log.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tracing::warn;

use super::routes::event_to_json;
use super::AppState;

/// Poll cadence for new event rows.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Rows fetched per poll.
const BATCH: i64 = 20;

/// `GET /api/logs/stream`: each new event row becomes one `data:` frame of
/// the event JSON, tailed from the current head of the log.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Start at the current head so clients only see what happens next
    let last_seen = state
        .events
        .query(&crate::events::EventFilter {
            limit: Some(1),
            ..crate::events::EventFilter::default()
        })
        .await
        .map(|rows| rows.first().map_or(0, |e| e.id))
        .unwrap_or(0);

    let stream = futures::stream::unfold(
        (state, last_seen, Vec::new()),
        |(state, mut last_id, mut pending): (AppState, i64, Vec<Event>)| async move {
            loop {
                if let Some(event) = pending.pop() {
                    return Some((Ok(event), (state, last_id, pending)));
                }

                tokio::time::sleep(POLL_INTERVAL).await;

                match state.events.events_after(last_id, BATCH).await {
                    Ok(rows) if !rows.is_empty() => {
                        last_id = rows.last().map_or(last_id, |e| e.id);
                        // Queue in reverse so pop() yields oldest-first
                        pending = rows
                            .iter()
                            .rev()
                            .map(|row| Event::default().data(event_to_json(row).to_string()))
                            .collect();
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Event stream poll failed"),
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}
