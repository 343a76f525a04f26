//! Creation-runner gating: missing providers skip, never fail.

mod support;

use tokio::sync::watch;

use roost_core::config::{ProviderConfig, SessionBudgets};
use roost_daemon::creation::CreationRunner;
use roost_daemon::events::{EventFilter, EventSink};

use support::{seed_device, test_codec, test_db, FakeDriver};

#[tokio::test]
async fn creation_is_skipped_without_providers() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;
    db.insert_niche("personal_finance", "Personal Finance", 1)
        .await
        .unwrap();

    let runner = CreationRunner::new(
        db.clone(),
        events.clone(),
        test_codec(),
        ProviderConfig::default(),
        SessionBudgets::default(),
    );

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    let created = runner
        .run(driver.as_ref(), &device, rx)
        .await
        .expect("skip is not an error");
    assert!(created.is_none());

    // No account row was written
    assert_eq!(db.total_accounts().await.unwrap(), 0);

    // The skip is materialized as a warning with the missing providers
    let skips = events
        .query(&EventFilter {
            event_type: Some("creation_skipped".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].severity, "warning");
    let context: serde_json::Value = serde_json::from_str(&skips[0].context).unwrap();
    let reason = context["reason"].as_str().unwrap();
    assert!(reason.contains("captcha"), "reason: {reason}");
    assert!(reason.contains("sms"));
    assert!(reason.contains("imap"));
}

#[tokio::test]
async fn creation_is_skipped_without_niches() {
    let db = test_db().await;
    let events = EventSink::new(db.clone());
    let device = seed_device(&db).await;

    let runner = CreationRunner::new(
        db.clone(),
        events.clone(),
        test_codec(),
        ProviderConfig::default(),
        SessionBudgets::default(),
    );

    let driver = FakeDriver::healthy();
    let (_tx, rx) = watch::channel(false);
    let created = runner.run(driver.as_ref(), &device, rx).await.unwrap();
    assert!(created.is_none());

    let skips = events
        .query(&EventFilter {
            event_type: Some("creation_skipped".into()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(skips.len(), 1);
    assert!(skips[0].message.contains("no active niches"));
}
