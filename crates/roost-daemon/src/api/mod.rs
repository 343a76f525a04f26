//! Dashboard REST + SSE surface.
//!
//! JSON endpoints over the store plus scheduler control. The SSE stream
//! tails the event table on a 2-second poll and emits each new row as a
//! `data:` frame.

mod routes;
mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::events::EventSink;
use crate::scheduler::Scheduler;
use crate::storage::Database;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub events: EventSink,
    pub scheduler: Arc<Scheduler>,
}

/// Build the dashboard router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/overview", get(routes::overview))
        .route("/api/accounts", get(routes::list_accounts))
        .route("/api/devices", get(routes::list_devices))
        .route("/api/events", get(routes::list_events))
        .route("/api/events/unresolved", get(routes::unresolved_events))
        .route("/api/events/:id/resolve", post(routes::resolve_event))
        .route("/api/logs/stream", get(sse::stream_events))
        .route("/api/scheduler/status", get(routes::scheduler_status))
        .route("/api/scheduler/start", post(routes::scheduler_start))
        .route("/api/scheduler/stop", post(routes::scheduler_stop))
        .with_state(state)
}
