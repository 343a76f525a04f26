//! Claim-protocol properties under concurrency.

mod support;

use roost_core::db::unix_timestamp;
use roost_daemon::storage::AccountState;

use support::{seed_account, test_codec, test_db};

#[tokio::test]
async fn concurrent_claimers_never_share_an_account() {
    let db = test_db().await;
    let codec = test_codec();

    let mut devices = Vec::new();
    for i in 0..8 {
        devices.push(
            db.register_device(
                &format!("iphone-{i}"),
                &format!("UDID-{i}"),
                "127.0.0.1",
                8100 + i,
            )
            .await
            .unwrap(),
        );
    }
    for i in 0..3 {
        seed_account(
            &db,
            &codec,
            "tiktok",
            &format!("acct{i}"),
            AccountState::Created,
            0,
        )
        .await;
    }

    let now = unix_timestamp();
    let mut handles = Vec::new();
    for device in &devices {
        let db = db.clone();
        let device_id = device.id.clone();
        handles.push(tokio::spawn(async move {
            db.claim_warming_task(&device_id, now).await.unwrap()
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(account) = handle.await.unwrap() {
            claimed.push(account.id);
        }
    }

    // Three eligible accounts, eight claimers: exactly three wins, no dupes
    assert_eq!(claimed.len(), 3);
    let mut unique = claimed.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3, "an account was claimed twice: {claimed:?}");
}

#[tokio::test]
async fn claimed_accounts_return_next_day() {
    let db = test_db().await;
    let codec = test_codec();
    let device = db
        .register_device("iphone-a", "UDID-A", "127.0.0.1", 8100)
        .await
        .unwrap();
    let account = seed_account(&db, &codec, "tiktok", "daily1", AccountState::WarmingP1, 2).await;

    // Mid-morning anchor so the one-hour-later probe stays inside the day
    let now = roost_core::db::start_of_day(unix_timestamp()) + 10 * 3_600;
    let first = db.claim_warming_task(&device.id, now).await.unwrap();
    assert_eq!(first.map(|a| a.id), Some(account.id.clone()));

    // Same day: nothing left to claim
    assert!(db.claim_warming_task(&device.id, now).await.unwrap().is_none());
    assert!(db
        .claim_warming_task(&device.id, now + 3_600)
        .await
        .unwrap()
        .is_none());

    // Next day window: eligible again
    let tomorrow = now + 86_400;
    let reclaimed = db.claim_warming_task(&device.id, tomorrow).await.unwrap();
    assert_eq!(reclaimed.map(|a| a.id), Some(account.id));
}

#[tokio::test]
async fn claim_priority_walks_the_ramp_order() {
    let db = test_db().await;
    let codec = test_codec();
    let device = db
        .register_device("iphone-a", "UDID-A", "127.0.0.1", 8100)
        .await
        .unwrap();

    seed_account(&db, &codec, "tiktok", "vet", AccountState::Active, 30).await;
    seed_account(&db, &codec, "tiktok", "mid", AccountState::WarmingP2, 5).await;
    seed_account(&db, &codec, "tiktok", "newbie", AccountState::Created, 0).await;

    let now = unix_timestamp();
    let order: Vec<String> = {
        let mut order = Vec::new();
        while let Some(account) = db.claim_warming_task(&device.id, now).await.unwrap() {
            order.push(account.username);
        }
        order
    };
    assert_eq!(order, vec!["newbie", "mid", "vet"]);
}
