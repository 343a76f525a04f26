//! The ordered session pipeline with explicit outcomes.

use std::sync::Arc;

use roost_core::config::SessionBudgets;
use roost_core::db::unix_timestamp;
use roost_crypto::CredentialCodec;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::agent::UiDriver;
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::storage::{Account, AccountState, Database, Device, Platform, WarmingOutcome};
use crate::warming::{self, SessionClock, WarmingPhase, WarmingReport};

use super::lifecycle;
use super::login::{login_account, Credentials};
use super::SessionError;

/// Why a session ended before recording a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Install,
    Login,
    Decryption,
    Warming,
    Stopped,
}

/// Result of one session run.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Warming finished; the account advanced one day.
    Completed {
        report: WarmingReport,
        new_state: AccountState,
        new_day_count: i64,
    },
    /// Session discarded; account state and day count untouched.
    Aborted(AbortReason),
}

/// Map a failed session to an exception state.
///
/// The core exposes this hook but ships no autonomous detector: platform
/// degradation signals (shadowbans, restrictions) arrive from outside through
/// the transition API. A deployment wanting automatic classification swaps
/// this body.
pub fn classify_outcome(_error: &SessionError) -> Option<AccountState> {
    None
}

/// Drives the delete → install → login → warm pipeline for one (device,
/// account) pair.
pub struct SessionRunner {
    db: Database,
    events: EventSink,
    codec: Arc<CredentialCodec>,
    budgets: SessionBudgets,
}

impl SessionRunner {
    pub fn new(
        db: Database,
        events: EventSink,
        codec: Arc<CredentialCodec>,
        budgets: SessionBudgets,
    ) -> Self {
        Self {
            db,
            events,
            codec,
            budgets,
        }
    }

    /// Run one warming session. Never panics the worker: every failure path
    /// emits its event and returns an outcome.
    pub async fn run(
        &self,
        driver: &dyn UiDriver,
        device: &Device,
        account: &Account,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SessionOutcome, SessionError> {
        let Some(platform) = Platform::parse(&account.platform) else {
            warn!(platform = %account.platform, "Claimed account has unknown platform");
            return Ok(SessionOutcome::Aborted(AbortReason::Login));
        };
        let state = account.state().unwrap_or(AccountState::Created);
        let phase = WarmingPhase::for_state(state);
        let started_at = unix_timestamp();

        self.events
            .emit(
                NewEvent::new(
                    Category::Scheduler,
                    Severity::Info,
                    event_type::WARMING_STARTED,
                    format!(
                        "Warming {platform}/{} (phase={})",
                        account.username,
                        phase.name()
                    ),
                )
                .device(&device.id)
                .account(&account.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "phase": phase.name(),
                    "duration_min": self.budgets.warming_secs / 60,
                })),
            )
            .await;

        // Steps 1-3 share the overhead budget
        let mut overhead = SessionClock::new(self.budgets.overhead(), shutdown.clone());

        // Step 1: make sure the app is not running. Best effort.
        lifecycle::ensure_terminated(driver, platform).await;

        // Step 2: reset the install identity
        if let Err(e) = lifecycle::delete_app(driver, &self.events, platform, &device.id).await {
            // A failed delete is recoverable; the reinstall may still land
            warn!(platform = %platform, error = %e, "App delete errored");
        }
        overhead.rest(std::time::Duration::from_secs(2)).await;

        let installed = match lifecycle::install_from_app_store(
            driver,
            &self.events,
            &mut overhead,
            platform,
            &device.id,
        )
        .await
        {
            Ok(installed) => installed,
            Err(e) => {
                warn!(platform = %platform, error = %e, "Install step errored");
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Device,
                            Severity::Error,
                            event_type::INSTALL_FAILED,
                            format!("Install of {platform} errored: {e}"),
                        )
                        .device(&device.id)
                        .account(&account.id)
                        .context(json!({"platform": platform.as_str(), "error": e.to_string()})),
                    )
                    .await;
                false
            }
        };
        if !installed {
            self.events
                .emit(
                    NewEvent::new(
                        Category::Scheduler,
                        Severity::Error,
                        event_type::INSTALL_FAILED,
                        format!("Failed to install {platform} for warming"),
                    )
                    .device(&device.id)
                    .account(&account.id)
                    .context(json!({"platform": platform.as_str()})),
                )
                .await;
            return Ok(SessionOutcome::Aborted(if overhead.stopped() {
                AbortReason::Stopped
            } else {
                AbortReason::Install
            }));
        }

        // Step 3: login with decrypted credentials
        let creds = match Credentials::decrypt(&self.codec, account) {
            Ok(creds) => creds,
            Err(e) => {
                error!(account = %account.username, error = %e, "Credential decryption failed");
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Account,
                            Severity::Critical,
                            event_type::DECRYPTION_FAILED,
                            format!("Cannot decrypt credentials for {}", account.username),
                        )
                        .device(&device.id)
                        .account(&account.id)
                        .context(json!({"platform": platform.as_str()})),
                    )
                    .await;
                // Mark the account so the claim stops picking it up
                if let Err(e) = self
                    .db
                    .transition_account_state(&account.id, AccountState::Flagged)
                    .await
                {
                    warn!(error = %e, "Could not flag account after decryption failure");
                }
                return Ok(SessionOutcome::Aborted(AbortReason::Decryption));
            }
        };

        let logged_in =
            match login_account(driver, &self.events, &mut overhead, account, platform, &creds)
                .await
            {
                Ok(logged_in) => logged_in,
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Login step errored");
                    self.events
                        .emit(
                            NewEvent::new(
                                Category::Account,
                                Severity::Error,
                                event_type::LOGIN_FAILED,
                                format!("{platform} login errored for {}", account.username),
                            )
                            .device(&device.id)
                            .account(&account.id)
                            .context(json!({
                                "platform": platform.as_str(),
                                "username": account.username,
                                "error": e.to_string(),
                            })),
                        )
                        .await;
                    false
                }
            };
        if !logged_in {
            self.events
                .emit(
                    NewEvent::new(
                        Category::Scheduler,
                        Severity::Error,
                        event_type::LOGIN_FAILED,
                        format!("Login failed for {platform}/{}", account.username),
                    )
                    .device(&device.id)
                    .account(&account.id)
                    .context(json!({
                        "platform": platform.as_str(),
                        "username": account.username,
                        "step": "login",
                    })),
                )
                .await;
            return Ok(SessionOutcome::Aborted(if overhead.stopped() {
                AbortReason::Stopped
            } else {
                AbortReason::Login
            }));
        }
        drop(creds);

        // Step 4: warming, on its own exact budget
        let hashtags = self.niche_hashtags_for(account).await;
        let mut clock = SessionClock::new(self.budgets.warming(), shutdown);
        let report = match warming::run_warming(driver, &mut clock, platform, phase, &hashtags).await
        {
            Ok(report) => report,
            Err(e) => {
                error!(
                    platform = %platform,
                    username = %account.username,
                    error = %e,
                    "Warming run errored"
                );
                // Partial progress is still recorded, without a day increment
                if let Err(db_err) = self
                    .db
                    .record_warming_partial(
                        &account.id,
                        &device.id,
                        platform.as_str(),
                        phase.number(),
                        account.warming_day_count,
                        &json!({"phase": phase.name(), "error": e.to_string()}).to_string(),
                        started_at,
                    )
                    .await
                {
                    warn!(error = %db_err, "Could not record partial warming session");
                }
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Scheduler,
                            Severity::Error,
                            event_type::WARMING_FAILED,
                            format!("Warming exception for {platform}/{}", account.username),
                        )
                        .device(&device.id)
                        .account(&account.id)
                        .context(json!({
                            "platform": platform.as_str(),
                            "username": account.username,
                            "phase": phase.name(),
                        })),
                    )
                    .await;

                let session_error = SessionError::Warming(e.to_string());
                if let Some(exception_state) = classify_outcome(&session_error) {
                    if let Err(db_err) = self
                        .db
                        .transition_account_state(&account.id, exception_state)
                        .await
                    {
                        warn!(error = %db_err, "Exception transition rejected");
                    }
                }
                self.cleanup(driver).await;
                return Ok(SessionOutcome::Aborted(AbortReason::Warming));
            }
        };

        if report.interrupted {
            // Shutdown preempted the warmer: keep the partial record, do not
            // advance the ramp.
            info!(
                platform = %platform,
                username = %account.username,
                videos = report.videos_watched,
                "Warming interrupted by shutdown"
            );
            if let Err(db_err) = self
                .db
                .record_warming_partial(
                    &account.id,
                    &device.id,
                    platform.as_str(),
                    phase.number(),
                    account.warming_day_count,
                    &serde_json::to_string(&report).unwrap_or_else(|_| "{}".into()),
                    started_at,
                )
                .await
            {
                warn!(error = %db_err, "Could not record interrupted warming session");
            }
            self.cleanup(driver).await;
            return Ok(SessionOutcome::Aborted(AbortReason::Stopped));
        }

        // Step 5-6: advance the ramp and persist the cycle atomically
        let new_day_count = account.warming_day_count + 1;
        let new_state = AccountState::for_day(new_day_count);
        let completed_at = unix_timestamp();

        self.db
            .record_warming_success(&WarmingOutcome {
                account_id: account.id.clone(),
                device_id: device.id.clone(),
                platform: platform.as_str().to_string(),
                warming_phase: phase.number(),
                new_day_count,
                new_state,
                session_data: serde_json::to_string(&report).unwrap_or_else(|_| "{}".into()),
                started_at,
                completed_at,
            })
            .await?;

        // Step 7: the completion event
        self.events
            .emit(
                NewEvent::new(
                    Category::Scheduler,
                    Severity::Info,
                    event_type::WARMING_COMPLETE,
                    format!(
                        "Warmed {platform}/{}: {} videos",
                        account.username, report.videos_watched
                    ),
                )
                .device(&device.id)
                .account(&account.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "videos_watched": report.videos_watched,
                    "likes": report.likes,
                    "follows": report.follows,
                    "duration_min": report.duration_secs / 60,
                    "phase": phase.name(),
                    "new_state": new_state.as_str(),
                    "warming_day": new_day_count,
                })),
            )
            .await;

        self.cleanup(driver).await;
        Ok(SessionOutcome::Completed {
            report,
            new_state,
            new_day_count,
        })
    }

    /// Hashtag set for the account's niche, for recommendation training.
    async fn niche_hashtags_for(&self, account: &Account) -> Vec<String> {
        let Some(niche_id) = account.niche_id.as_deref() else {
            return Vec::new();
        };
        match self.db.get_niche(niche_id).await {
            Ok(niche) => warming::niche_hashtags(&niche.slug)
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Post-session cleanup: return to the home screen. Best effort.
    async fn cleanup(&self, driver: &dyn UiDriver) {
        if let Err(e) = driver.press_button("home").await {
            warn!(error = %e, "Could not return to home screen");
        }
    }
}
