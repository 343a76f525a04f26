//! Shared fixtures for integration tests: a scripted UI driver and seeded
//! database rows.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use roost_crypto::CredentialCodec;
use roost_daemon::agent::{AgentError, ScreenSize, Strategy, UiDriver};
use roost_daemon::storage::{Account, AccountState, Database, Device};

/// Scripted driver: every interaction succeeds by default; knobs flip
/// specific failure modes.
pub struct FakeDriver {
    /// Value `app_state` reports. Negative means "return HTTP 500".
    pub app_state_value: AtomicI64,
    /// When true, element lookups find a synthetic element.
    pub elements_exist: bool,
    /// After this many swipes, swiping starts returning HTTP 500 (0 = never).
    pub fail_swipes_after: u32,
    pub swipes: AtomicU32,
    pub taps: AtomicU32,
    pub activations: AtomicU32,
    pub uninstalls: AtomicU32,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            app_state_value: AtomicI64::new(4),
            elements_exist: true,
            fail_swipes_after: 0,
            swipes: AtomicU32::new(0),
            taps: AtomicU32::new(0),
            activations: AtomicU32::new(0),
            uninstalls: AtomicU32::new(0),
        }
    }
}

impl FakeDriver {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A device whose app store installs never finish (agent reports 500).
    pub fn broken_install() -> Arc<Self> {
        Arc::new(Self {
            app_state_value: AtomicI64::new(-1),
            ..Self::default()
        })
    }

    /// A device whose feed gestures start failing mid-warming.
    pub fn flaky_gestures(after: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_swipes_after: after,
            ..Self::default()
        })
    }

    fn server_error() -> AgentError {
        AgentError::Status {
            status: 500,
            body: "internal error".to_string(),
        }
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn activate_app(&self, _bundle_id: &str) -> Result<(), AgentError> {
        self.activations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn terminate_app(&self, _bundle_id: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn uninstall_app(&self, _bundle_id: &str) -> Result<bool, AgentError> {
        self.uninstalls.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn app_state(&self, _bundle_id: &str) -> Result<i64, AgentError> {
        let value = self.app_state_value.load(Ordering::Relaxed);
        if value < 0 {
            return Err(Self::server_error());
        }
        Ok(value)
    }

    async fn find_element(
        &self,
        _strategy: Strategy,
        value: &str,
    ) -> Result<Option<String>, AgentError> {
        if self.elements_exist {
            Ok(Some(format!("el-{}", value.len())))
        } else {
            Ok(None)
        }
    }

    async fn click_element(&self, _element_id: &str) -> Result<(), AgentError> {
        self.taps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn set_element_value(&self, _element_id: &str, _text: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn touch_and_hold(
        &self,
        _element_id: &str,
        _duration_secs: f64,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn tap(&self, _x: i64, _y: i64) -> Result<(), AgentError> {
        self.taps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn double_tap(&self, _x: i64, _y: i64) -> Result<(), AgentError> {
        self.taps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn swipe(
        &self,
        _from: (i64, i64),
        _to: (i64, i64),
        _duration_secs: f64,
    ) -> Result<(), AgentError> {
        let count = self.swipes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_swipes_after > 0 && count > self.fail_swipes_after {
            return Err(Self::server_error());
        }
        Ok(())
    }

    fn screen_size(&self) -> ScreenSize {
        ScreenSize::DEFAULT
    }

    async fn alert_text(&self) -> Result<Option<String>, AgentError> {
        Ok(None)
    }

    async fn accept_alert(&self) -> Result<bool, AgentError> {
        Ok(true)
    }

    async fn dismiss_alert(&self) -> Result<bool, AgentError> {
        Ok(true)
    }

    async fn press_button(&self, _name: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

pub fn test_codec() -> Arc<CredentialCodec> {
    Arc::new(CredentialCodec::new(&[42u8; 32]).expect("32-byte key"))
}

pub fn test_master_key() -> String {
    base64::engine::general_purpose::STANDARD.encode([42u8; 32])
}

pub async fn test_db() -> Database {
    Database::open_in_memory().await.expect("in-memory database")
}

pub async fn seed_device(db: &Database) -> Device {
    db.register_device("iphone-a", "TEST-UDID-A", "127.0.0.1", 8100)
        .await
        .expect("device row")
}

/// Insert an account with real encrypted credentials in a given ramp position.
pub async fn seed_account(
    db: &Database,
    codec: &CredentialCodec,
    platform: &str,
    username: &str,
    state: AccountState,
    day_count: i64,
) -> Account {
    let niche = match db.list_active_niches().await.expect("niches").first() {
        Some(n) => n.clone(),
        None => db
            .insert_niche("personal_finance", "Personal Finance", 1)
            .await
            .expect("niche row"),
    };

    let email_enc = codec.encrypt_str(&format!("{username}@example.com")).expect("encrypt");
    let password_enc = codec.encrypt_str("Hunter2!").expect("encrypt");
    let totp_enc = codec
        .encrypt_str(&roost_crypto::totp::generate_secret())
        .expect("encrypt");

    let account = db
        .insert_account(
            platform,
            username,
            &email_enc,
            &password_enc,
            &totp_enc,
            &niche.id,
            None,
        )
        .await
        .expect("account row");

    sqlx::query("UPDATE accounts SET current_state = ?, warming_day_count = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(day_count)
        .bind(&account.id)
        .execute(db.pool())
        .await
        .expect("seed update");

    db.get_account(&account.id).await.expect("account reload")
}
