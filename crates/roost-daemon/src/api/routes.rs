//! JSON route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use roost_core::db::{start_of_day, unix_timestamp};

use crate::events::EventFilter;
use crate::scheduler::ControlOutcome;
use crate::storage::{DatabaseError, SystemEvent};

use super::AppState;

/// Uniform error mapping: storage errors become a JSON 500 (404 for misses).
fn db_error(e: DatabaseError) -> Response {
    let status = match e {
        DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

/// Events carry their context as a JSON string in storage; expand it for
/// API consumers.
pub(super) fn event_to_json(event: &SystemEvent) -> Value {
    let context: Value =
        serde_json::from_str(&event.context).unwrap_or_else(|_| json!({}));
    json!({
        "id": event.id,
        "timestamp": event.timestamp,
        "category": event.category,
        "severity": event.severity,
        "event_type": event.event_type,
        "device_id": event.device_id,
        "account_id": event.account_id,
        "message": event.message,
        "context": context,
        "resolved": event.resolved,
        "resolved_by": event.resolved_by,
        "resolved_at": event.resolved_at,
    })
}

/// `GET /api/overview`: fleet counts and recent events.
pub async fn overview(State(state): State<AppState>) -> Result<Json<Value>, Response> {
    let accounts = state.db.account_counts().await.map_err(db_error)?;
    let total_accounts = state.db.total_accounts().await.map_err(db_error)?;
    let devices = state.db.list_devices().await.map_err(db_error)?;
    let active_devices = devices.iter().filter(|d| d.status == "active").count();
    let error_count = state
        .events
        .unresolved_error_count()
        .await
        .map_err(db_error)?;
    let sessions_today = state
        .events
        .sessions_since(start_of_day(unix_timestamp()))
        .await
        .map_err(db_error)?;
    let recent = state
        .events
        .query(&EventFilter {
            limit: Some(10),
            ..EventFilter::default()
        })
        .await
        .map_err(db_error)?;
    let niches = state.db.list_active_niches().await.map_err(db_error)?;

    let accounts_by_platform: Vec<Value> = accounts
        .iter()
        .map(|(platform, status, count)| {
            json!({"platform": platform, "current_state": status, "count": count})
        })
        .collect();

    Ok(Json(json!({
        "total_accounts": total_accounts,
        "active_devices": active_devices,
        "error_count": error_count,
        "sessions_today": sessions_today,
        "accounts_by_platform": accounts_by_platform,
        "devices_by_status": devices
            .iter()
            .fold(std::collections::HashMap::<&str, i64>::new(), |mut acc, d| {
                *acc.entry(d.status.as_str()).or_default() += 1;
                acc
            }),
        "recent_events": recent.iter().map(event_to_json).collect::<Vec<_>>(),
        "niches": niches,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    platform: Option<String>,
    state: Option<String>,
    niche: Option<String>,
    limit: Option<i64>,
}

/// `GET /api/accounts`: filtered account listing. Credential tokens are
/// never exposed.
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<Value>, Response> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let accounts = state
        .db
        .list_accounts(
            query.platform.as_deref(),
            query.state.as_deref(),
            query.niche.as_deref(),
            limit,
        )
        .await
        .map_err(db_error)?;

    let rows: Vec<Value> = accounts
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "platform": a.platform,
                "username": a.username,
                "niche_id": a.niche_id,
                "device_id": a.device_id,
                "current_state": a.current_state,
                "warming_day_count": a.warming_day_count,
                "followers": a.followers,
                "following": a.following,
                "last_activity_at": a.last_activity_at,
                "last_warmed_at": a.last_warmed_at,
                "last_post_at": a.last_post_at,
                "created_at": a.created_at,
            })
        })
        .collect();
    Ok(Json(json!(rows)))
}

/// `GET /api/devices`
pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Value>, Response> {
    let devices = state.db.list_devices().await.map_err(db_error)?;
    Ok(Json(json!(devices)))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    severity: Option<String>,
    category: Option<String>,
    event_type: Option<String>,
    device_id: Option<String>,
    account_id: Option<String>,
    resolved: Option<bool>,
    after_id: Option<i64>,
    limit: Option<i64>,
}

/// `GET /api/events`: cursored, filtered event query.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, Response> {
    let events = state
        .events
        .query(&EventFilter {
            severity: query.severity,
            category: query.category,
            event_type: query.event_type,
            device_id: query.device_id,
            account_id: query.account_id,
            resolved: query.resolved,
            after_id: query.after_id,
            limit: query.limit,
        })
        .await
        .map_err(db_error)?;
    Ok(Json(json!(events.iter().map(event_to_json).collect::<Vec<_>>())))
}

#[derive(Debug, Deserialize)]
pub struct UnresolvedQuery {
    severity: Option<String>,
    category: Option<String>,
    limit: Option<i64>,
}

/// `GET /api/events/unresolved`
pub async fn unresolved_events(
    State(state): State<AppState>,
    Query(query): Query<UnresolvedQuery>,
) -> Result<Json<Value>, Response> {
    let events = state
        .events
        .unresolved(query.severity, query.category, query.limit)
        .await
        .map_err(db_error)?;
    Ok(Json(json!(events.iter().map(event_to_json).collect::<Vec<_>>())))
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    resolved_by: Option<String>,
}

/// `POST /api/events/{id}/resolve`
pub async fn resolve_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Value>, Response> {
    let resolved_by = query.resolved_by.as_deref().unwrap_or("human");
    let ok = state
        .events
        .resolve(event_id, resolved_by)
        .await
        .map_err(db_error)?;
    Ok(Json(json!({"ok": ok})))
}

/// `GET /api/scheduler/status`
pub async fn scheduler_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.scheduler.status().await))
}

/// `POST /api/scheduler/start`
pub async fn scheduler_start(State(state): State<AppState>) -> Result<Json<Value>, Response> {
    match state.scheduler.start().await.map_err(db_error)? {
        ControlOutcome::AlreadyRunning => {
            Ok(Json(json!({"ok": false, "message": "Scheduler already running"})))
        }
        ControlOutcome::Started(count) => Ok(Json(json!({
            "ok": true,
            "message": format!("Scheduler started with {count} devices"),
        }))),
        _ => Ok(Json(json!({"ok": false, "message": "Unexpected state"}))),
    }
}

/// `POST /api/scheduler/stop`
pub async fn scheduler_stop(State(state): State<AppState>) -> Json<Value> {
    match state.scheduler.stop().await {
        ControlOutcome::NotRunning => {
            Json(json!({"ok": false, "message": "Scheduler not running"}))
        }
        _ => Json(json!({"ok": true, "message": "Scheduler stopped"})),
    }
}
