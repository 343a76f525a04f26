//! End-to-end session runner scenarios against a scripted driver.
//!
//! Paused tokio time compresses the 30-minute warming budget to instants
//! while preserving every deadline interaction.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use roost_core::config::SessionBudgets;
use roost_daemon::events::{EventFilter, EventSink};
use roost_daemon::session::{AbortReason, SessionOutcome, SessionRunner};
use roost_daemon::storage::AccountState;

use support::{seed_account, seed_device, test_codec, test_db, FakeDriver};

fn runner(
    db: roost_daemon::storage::Database,
    events: EventSink,
) -> SessionRunner {
    SessionRunner::new(db, events, test_codec(), SessionBudgets::default())
}

#[tokio::test(start_paused = true)]
async fn fresh_account_warm_up_cycle() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "tiktok",
        "fresh1",
        AccountState::Created,
        0,
    )
    .await;

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    let outcome = runner(db.clone(), events.clone())
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session runs");

    match outcome {
        SessionOutcome::Completed {
            new_state,
            new_day_count,
            report,
        } => {
            assert_eq!(new_state, AccountState::WarmingP1);
            assert_eq!(new_day_count, 1);
            assert_eq!(report.phase, "PASSIVE");
            assert_eq!(report.likes, 0, "phase 1 never engages");
            assert_eq!(report.follows, 0);
            assert!(report.videos_watched > 0, "the feed loop must have run");
        }
        other => panic!("expected completion, got {other:?}"),
    }

    // Account advanced exactly one day
    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.current_state, "warming_p1");
    assert_eq!(account.warming_day_count, 1);
    assert!(account.last_warmed_at.is_some());

    // Exactly one progress row, phase 1, completed
    let history = db.warming_history(&account.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].warming_phase, 1);
    assert_eq!(history[0].warming_day, 1);
    assert!(history[0].completed_at.is_some());

    // Exactly one warming_complete, with the structured context
    let complete = events
        .query(&EventFilter {
            event_type: Some("warming_complete".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(complete.len(), 1);
    let context: serde_json::Value = serde_json::from_str(&complete[0].context).unwrap();
    assert_eq!(context["phase"], "PASSIVE");
    assert_eq!(context["warming_day"], 1);
    assert_eq!(context["new_state"], "warming_p1");

    // The reinstall actually happened
    assert!(driver.uninstalls.load(std::sync::atomic::Ordering::Relaxed) >= 1);
}

#[tokio::test(start_paused = true)]
async fn install_failure_leaves_account_untouched() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "tiktok",
        "fresh2",
        AccountState::Created,
        0,
    )
    .await;

    let driver = FakeDriver::broken_install();
    let (_tx, rx) = watch::channel(false);
    let outcome = runner(db.clone(), events.clone())
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session aborts without erroring the worker");

    assert!(matches!(
        outcome,
        SessionOutcome::Aborted(AbortReason::Install)
    ));

    // No state change, no day increment
    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.current_state, "created");
    assert_eq!(account.warming_day_count, 0);

    // No progress row, no completion event, but the failure event exists
    assert!(db.warming_history(&account.id, 10).await.unwrap().is_empty());
    let complete = events
        .query(&EventFilter {
            event_type: Some("warming_complete".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert!(complete.is_empty());

    let failures = events
        .query(&EventFilter {
            event_type: Some("install_failed".into()),
            category: Some("device".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert!(!failures.is_empty(), "device install_failed must be emitted");
}

#[tokio::test(start_paused = true)]
async fn phase_rollover_on_day_four() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "tiktok",
        "ramp1",
        AccountState::WarmingP1,
        3,
    )
    .await;

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    let outcome = runner(db.clone(), events)
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session runs");

    match outcome {
        SessionOutcome::Completed {
            new_state,
            new_day_count,
            ..
        } => {
            assert_eq!(new_day_count, 4);
            assert_eq!(new_state, AccountState::WarmingP2);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.current_state, "warming_p2");
    assert_eq!(account.warming_day_count, 4);
}

#[tokio::test(start_paused = true)]
async fn day_fifteen_reaches_active() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "instagram",
        "almost_done",
        AccountState::WarmingP3,
        14,
    )
    .await;

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    runner(db.clone(), events)
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session runs");

    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.current_state, "active");
    assert_eq!(account.warming_day_count, 15);
}

#[tokio::test(start_paused = true)]
async fn warming_error_records_partial_without_increment() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "tiktok",
        "flaky1",
        AccountState::WarmingP1,
        2,
    )
    .await;

    // Let install/login gestures pass, then break the feed swipes
    let driver = FakeDriver::flaky_gestures(3);
    let (_tx, rx) = watch::channel(false);
    let outcome = runner(db.clone(), events.clone())
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session aborts without erroring the worker");

    assert!(matches!(
        outcome,
        SessionOutcome::Aborted(AbortReason::Warming)
    ));

    // Day count untouched
    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.warming_day_count, 2);
    assert_eq!(account.current_state, "warming_p1");

    // Partial record exists and is marked unfinished
    let history = db.warming_history(&account.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completed_at.is_none());

    let failed = events
        .query(&EventFilter {
            event_type: Some("warming_failed".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_preempts_warming() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "tiktok",
        "sleepy1",
        AccountState::WarmingP1,
        1,
    )
    .await;

    let driver = FakeDriver::healthy();
    let (tx, rx) = watch::channel(false);

    let session_db = db.clone();
    let session_events = events.clone();
    let session_device = device.clone();
    let session_account = account.clone();
    let session_driver = Arc::clone(&driver);
    let handle = tokio::spawn(async move {
        runner(session_db, session_events)
            .run(session_driver.as_ref(), &session_device, &session_account, rx)
            .await
    });

    // Stop mid-warming, well inside the 30-minute budget
    tokio::time::sleep(Duration::from_secs(12 * 60)).await;
    tx.send(true).expect("stop signal");

    let outcome = handle
        .await
        .expect("task joins")
        .expect("session aborts cleanly");
    assert!(matches!(
        outcome,
        SessionOutcome::Aborted(AbortReason::Stopped)
    ));

    // No ramp progress, no completion event; the partial record is kept
    let account = db.get_account(&account.id).await.unwrap();
    assert_eq!(account.warming_day_count, 1);

    let complete = events
        .query(&EventFilter {
            event_type: Some("warming_complete".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert!(complete.is_empty());

    let history = db.warming_history(&account.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completed_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn engagement_phase_respects_caps() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    let account = seed_account(
        &db,
        &test_codec(),
        "instagram",
        "engaged1",
        AccountState::WarmingP2,
        5,
    )
    .await;

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    let outcome = runner(db.clone(), events)
        .run(driver.as_ref(), &device, &account, rx)
        .await
        .expect("session runs");

    match outcome {
        SessionOutcome::Completed { report, .. } => {
            assert_eq!(report.phase, "LIGHT");
            assert!(report.likes <= 10, "like cap breached: {}", report.likes);
            assert!(report.follows <= 5, "follow cap breached: {}", report.follows);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
