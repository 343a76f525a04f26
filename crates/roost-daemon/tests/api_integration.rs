//! Dashboard API tests via in-process router requests.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use roost_core::config::Config;
use roost_daemon::api::{build_router, AppState};
use roost_daemon::events::{event_type, Category, EventSink, NewEvent, Severity};
use roost_daemon::scheduler::Scheduler;
use roost_daemon::storage::AccountState;

use support::{seed_account, seed_device, test_codec, test_db, test_master_key};

async fn state() -> AppState {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let config = Config::with_master_key(test_master_key()).expect("config");
    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        events.clone(),
        test_codec(),
        config,
    ));
    AppState {
        db,
        events,
        scheduler,
    }
}

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    request_json(state, "GET", uri).await
}

async fn post_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    request_json(state, "POST", uri).await
}

async fn request_json(
    state: &AppState,
    method: &str,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let resp = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn overview_reports_fleet_counts() {
    let state = state().await;
    seed_device(&state.db).await;
    seed_account(
        &state.db,
        &test_codec(),
        "tiktok",
        "cash123",
        AccountState::WarmingP1,
        2,
    )
    .await;

    let (status, body) = get_json(&state, "/api/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_accounts"], 1);
    assert_eq!(body["active_devices"], 1);
    assert_eq!(body["accounts_by_platform"][0]["platform"], "tiktok");
    assert_eq!(body["sessions_today"], 0);
}

#[tokio::test]
async fn accounts_endpoint_filters_and_hides_secrets() {
    let state = state().await;
    seed_account(
        &state.db,
        &test_codec(),
        "tiktok",
        "cash1",
        AccountState::Created,
        0,
    )
    .await;
    seed_account(
        &state.db,
        &test_codec(),
        "instagram",
        "cash2",
        AccountState::Active,
        20,
    )
    .await;

    let (status, body) = get_json(&state, "/api/accounts?platform=tiktok").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["username"], "cash1");
    assert!(
        rows[0].get("email_enc").is_none(),
        "credential tokens must not be exposed"
    );

    let (_, body) = get_json(&state, "/api/accounts?state=active").await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = get_json(&state, "/api/accounts").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn devices_endpoint_lists_fleet() {
    let state = state().await;
    seed_device(&state.db).await;

    let (status, body) = get_json(&state, "/api/devices").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["udid"], "TEST-UDID-A");
    assert_eq!(rows[0]["status"], "active");
}

#[tokio::test]
async fn events_query_resolve_and_cursor() {
    let state = state().await;
    let first = state
        .events
        .emit(NewEvent::new(
            Category::Scheduler,
            Severity::Info,
            event_type::WARMING_COMPLETE,
            "warmed",
        ))
        .await
        .unwrap();
    state
        .events
        .emit(NewEvent::new(
            Category::Device,
            Severity::Error,
            event_type::INSTALL_FAILED,
            "broke",
        ))
        .await
        .unwrap();

    // Severity filter
    let (status, body) = get_json(&state, "/api/events?severity=error").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["event_type"], "install_failed");

    // Cursor
    let (_, body) = get_json(&state, &format!("/api/events?after_id={first}")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Unresolved then resolve
    let (_, body) = get_json(&state, "/api/events/unresolved?severity=error").await;
    let unresolved = body.as_array().unwrap();
    assert_eq!(unresolved.len(), 1);
    let id = unresolved[0]["id"].as_i64().unwrap();

    let (status, body) = post_json(&state, &format!("/api/events/{id}/resolve?resolved_by=ops")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, body) = get_json(&state, "/api/events/unresolved").await;
    assert!(body.as_array().unwrap().is_empty());

    // Resolving a missing id reports ok=false
    let (_, body) = post_json(&state, "/api/events/99999/resolve").await;
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn scheduler_lifecycle_with_empty_fleet() {
    let state = state().await;

    // Idle before start
    let (status, body) = get_json(&state, "/api/scheduler/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);

    // Start with no devices: runs idle and emits the warning
    let (_, body) = post_json(&state, "/api/scheduler/start").await;
    assert_eq!(body["ok"], true);

    let (_, body) = get_json(&state, "/api/scheduler/status").await;
    assert_eq!(body["running"], true);
    assert_eq!(body["device_count"], 0);

    let (_, body) = get_json(&state, "/api/events?event_type=no_devices").await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Double start is rejected
    let (_, body) = post_json(&state, "/api/scheduler/start").await;
    assert_eq!(body["ok"], false);

    // Graceful stop still works, and the stop is the terminal event
    let (_, body) = post_json(&state, "/api/scheduler/stop").await;
    assert_eq!(body["ok"], true);

    let (_, body) = get_json(&state, "/api/scheduler/status").await;
    assert_eq!(body["running"], false);

    let (_, body) = get_json(&state, "/api/events?limit=1").await;
    assert_eq!(body.as_array().unwrap()[0]["event_type"], "scheduler_stopped");

    // Stopping again is a no-op
    let (_, body) = post_json(&state, "/api/scheduler/stop").await;
    assert_eq!(body["ok"], false);
}
