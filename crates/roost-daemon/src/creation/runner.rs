//! The end-to-end signup flow.

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use roost_core::config::{ImapSettings, ProviderConfig, SessionBudgets};
use roost_crypto::{totp, CredentialCodec};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::agent::{AgentError, Automation, Strategy, UiDriver};
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::session::lifecycle;
use crate::session::bundle_id;
use crate::storage::{Account, CreationTarget, Database, Device, Platform};
use crate::verify::{poll_for_email_code, CaptchaClient, SmsClient};
use crate::warming::SessionClock;

use super::username;
use super::CreationError;

/// Provider credentials proven present for one creation attempt.
struct Providers<'a> {
    captcha_key: &'a str,
    sms_key: &'a str,
    imap: &'a ImapSettings,
}

/// Drives one account-creation attempt on a device.
pub struct CreationRunner {
    db: Database,
    events: EventSink,
    codec: Arc<CredentialCodec>,
    providers: ProviderConfig,
    budgets: SessionBudgets,
}

impl CreationRunner {
    pub fn new(
        db: Database,
        events: EventSink,
        codec: Arc<CredentialCodec>,
        providers: ProviderConfig,
        budgets: SessionBudgets,
    ) -> Self {
        Self {
            db,
            events,
            codec,
            providers,
            budgets,
        }
    }

    /// Attempt to create one account. Returns the new row on success; on any
    /// failure the partial progress is discarded and None comes back with
    /// the failure already materialized as events.
    pub async fn run(
        &self,
        driver: &dyn UiDriver,
        device: &Device,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Option<Account>, CreationError> {
        let Some(target) = self.db.creation_target().await? else {
            self.skip(device, "no active niches").await;
            return Ok(None);
        };

        // Creation needs all three external providers; missing ones are a
        // skip, never a failure.
        let (Some(captcha_key), Some(sms_key), Some(imap)) = (
            self.providers.captcha_api_key.as_deref(),
            self.providers.sms_api_key.as_deref(),
            self.providers.imap.as_ref(),
        ) else {
            let missing = self.providers.missing().join(", ");
            self.skip(device, &format!("providers not configured: {missing}"))
                .await;
            return Ok(None);
        };
        let providers = Providers {
            captcha_key,
            sms_key,
            imap,
        };

        let Some(platform) = Platform::parse(&target.platform) else {
            self.skip(device, "creation target has unknown platform").await;
            return Ok(None);
        };

        self.events
            .emit(
                NewEvent::new(
                    Category::Scheduler,
                    Severity::Info,
                    event_type::CREATION_STARTED,
                    format!("Creating new {platform} account on {}", device.name),
                )
                .device(&device.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "niche": target.niche_slug,
                })),
            )
            .await;

        let username =
            username::synthesize(&self.db, platform.as_str(), &target.niche_slug).await?;
        let email = mailbox_address(providers.imap, &username);
        let password = generate_password();

        self.events
            .emit(
                NewEvent::new(
                    Category::Account,
                    Severity::Info,
                    event_type::ACCOUNT_CREATION_STARTED,
                    format!("Starting {platform} account creation: {username}"),
                )
                .device(&device.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "niche": target.niche_slug,
                    "email": email,
                })),
            )
            .await;

        let mut clock = SessionClock::new(self.budgets.overhead(), shutdown);
        match self
            .drive_signup(
                driver, device, &mut clock, &providers, platform, &target, &email, &password,
                &username,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(CreationError::Agent(e)) => {
                warn!(error = %e, "Signup flow hit an agent error");
                self.fail(device, platform, &username, "signup", &e.to_string())
                    .await;
                return Ok(None);
            }
            Err(other) => return Err(other),
        }

        // Ongoing 2FA seed; the disposable SMS number is gone by now
        let totp_secret = totp::generate_secret();

        let email_enc = self
            .codec
            .encrypt_str(&email)
            .map_err(|e| CreationError::Crypto(e.to_string()))?;
        let password_enc = self
            .codec
            .encrypt_str(&password)
            .map_err(|e| CreationError::Crypto(e.to_string()))?;
        let totp_enc = self
            .codec
            .encrypt_str(&totp_secret)
            .map_err(|e| CreationError::Crypto(e.to_string()))?;

        let account = self
            .db
            .insert_account(
                platform.as_str(),
                &username,
                &email_enc,
                &password_enc,
                &totp_enc,
                &target.niche_id,
                Some(&device.id),
            )
            .await?;

        info!(platform = %platform, username = %username, "Account created");
        self.events
            .emit(
                NewEvent::new(
                    Category::Account,
                    Severity::Info,
                    event_type::ACCOUNT_CREATED,
                    format!("Created {platform} account {username}"),
                )
                .device(&device.id)
                .account(&account.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "username": username,
                    "niche": target.niche_slug,
                })),
            )
            .await;

        Ok(Some(account))
    }

    /// Run the on-device signup screens for a platform. Returns false when a
    /// step failed (events already emitted); partial progress is discarded by
    /// the caller.
    #[allow(clippy::too_many_arguments)]
    async fn drive_signup(
        &self,
        driver: &dyn UiDriver,
        device: &Device,
        clock: &mut SessionClock,
        providers: &Providers<'_>,
        platform: Platform,
        target: &CreationTarget,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<bool, CreationError> {
        // Fresh install identity, exactly like a warming session
        lifecycle::delete_app(driver, &self.events, platform, &device.id).await?;
        clock.rest(Duration::from_secs(2)).await;
        if !lifecycle::install_from_app_store(driver, &self.events, clock, platform, &device.id)
            .await?
        {
            self.fail(device, platform, username, "install", "install failed")
                .await;
            return Ok(false);
        }

        let auto = Automation::new(driver);
        driver.activate_app(bundle_id(platform)).await?;
        if !clock.rest(Duration::from_secs(4)).await {
            return Ok(false);
        }
        auto.dismiss_popups(3).await?;

        // Reach the email signup form
        let entry_labels: &[&str] = match platform {
            Platform::Tiktok => &["Sign up", "Use phone or email", "Use email"],
            _ => &["Create new account", "Sign up", "Sign Up"],
        };
        for label in entry_labels {
            if auto.tap_element(Strategy::AccessibilityId, label).await?
                && !clock.rest(Duration::from_secs(2)).await
            {
                return Ok(false);
            }
        }

        if !auto
            .type_into(
                Strategy::PredicateString,
                r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "email" OR name CONTAINS "Email")"#,
                email,
            )
            .await?
        {
            self.fail(device, platform, username, "signup", "email field not found")
                .await;
            return Ok(false);
        }
        for label in ["Next", "Continue"] {
            if auto.tap_element(Strategy::AccessibilityId, label).await? {
                break;
            }
        }
        if !clock.rest(Duration::from_secs(3)).await {
            return Ok(false);
        }

        // CAPTCHA gate, solved from a screenshot when the platform shows one
        if !self
            .maybe_solve_captcha(driver, device, clock, providers.captcha_key, platform)
            .await?
        {
            return Ok(false);
        }

        // Email verification code
        let Some(email_code) = poll_for_email_code(providers.imap, platform).await? else {
            self.fail(
                device,
                platform,
                username,
                "email_verification",
                "no code received",
            )
            .await;
            return Ok(false);
        };
        if !self.enter_code(driver, clock, &email_code).await? {
            return Ok(false);
        }

        // SMS verification through the disposable-number provider
        let sms = SmsClient::new(providers.sms_key.to_string())?;
        let verification = match sms.request_number(platform).await {
            Ok(v) => v,
            Err(e) => {
                self.fail(device, platform, username, "sms_verification", &e.to_string())
                    .await;
                return Ok(false);
            }
        };

        if auto
            .type_into(
                Strategy::PredicateString,
                r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "phone" OR name CONTAINS "Phone")"#,
                &verification.phone_number,
            )
            .await?
        {
            for label in ["Next", "Continue", "Send code"] {
                if auto.tap_element(Strategy::AccessibilityId, label).await? {
                    break;
                }
            }
        }

        let sms_code = sms.wait_for_code(&verification).await?;
        sms.cancel(&verification).await;
        let Some(sms_code) = sms_code else {
            self.fail(
                device,
                platform,
                username,
                "sms_verification",
                "no code received",
            )
            .await;
            return Ok(false);
        };
        if !self.enter_code(driver, clock, &sms_code).await? {
            return Ok(false);
        }

        // Password, then the handle
        auto.type_into(
            Strategy::PredicateString,
            r#"type == "XCUIElementTypeSecureTextField""#,
            password,
        )
        .await?;
        for label in ["Next", "Continue", "Sign up"] {
            if auto.tap_element(Strategy::AccessibilityId, label).await? {
                break;
            }
        }
        if !clock.rest(Duration::from_secs(2)).await {
            return Ok(false);
        }

        if auto
            .type_into(
                Strategy::PredicateString,
                r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "username" OR name CONTAINS "Username")"#,
                username,
            )
            .await?
        {
            for label in ["Next", "Continue", "Confirm"] {
                if auto.tap_element(Strategy::AccessibilityId, label).await? {
                    break;
                }
            }
        }

        // Skip interest pickers, contact sync, and the rest of onboarding
        for _ in 0..4 {
            if !clock.rest(Duration::from_secs(2)).await {
                return Ok(false);
            }
            if auto.dismiss_popups(2).await? == 0
                && !auto.tap_element(Strategy::AccessibilityId, "Skip").await?
            {
                break;
            }
        }

        info!(
            platform = %platform,
            username,
            niche = %target.niche_slug,
            "Signup screens completed"
        );
        Ok(true)
    }

    /// Probe for a CAPTCHA and solve it from a screenshot. Returns false when
    /// a CAPTCHA was present and could not be solved.
    async fn maybe_solve_captcha(
        &self,
        driver: &dyn UiDriver,
        device: &Device,
        clock: &mut SessionClock,
        captcha_key: &str,
        platform: Platform,
    ) -> Result<bool, CreationError> {
        let indicator = driver
            .find_element(
                Strategy::PredicateString,
                r#"name CONTAINS "captcha" OR name CONTAINS "Verify" OR name CONTAINS "puzzle""#,
            )
            .await?;
        if indicator.is_none() {
            return Ok(true);
        }

        let solver = CaptchaClient::new(captcha_key.to_string())?;
        let screenshot = driver.screenshot().await?;

        match solver.solve_slide(&screenshot).await? {
            Some(solution) => {
                // Slide solutions give a horizontal offset to drag to
                if let Some(offset) = solution["x"].as_i64() {
                    let size = driver.screen_size();
                    let y = size.height / 2;
                    driver
                        .swipe((size.width / 5, y), (size.width / 5 + offset, y), 1.0)
                        .await?;
                }
                clock.rest(Duration::from_secs(2)).await;
                Ok(true)
            }
            None => {
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Auth,
                            Severity::Warning,
                            event_type::CAPTCHA_FAILED,
                            format!("Slide CAPTCHA solve failed for {platform}"),
                        )
                        .device(&device.id)
                        .context(json!({
                            "platform": platform.as_str(),
                            "solver": "capsolver",
                            "type": "slide",
                        })),
                    )
                    .await;
                Ok(false)
            }
        }
    }

    /// Type a verification code into the visible code field.
    async fn enter_code(
        &self,
        driver: &dyn UiDriver,
        clock: &mut SessionClock,
        code: &str,
    ) -> Result<bool, AgentError> {
        let auto = Automation::new(driver);
        if auto
            .type_into(
                Strategy::PredicateString,
                r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "code" OR name CONTAINS "Code")"#,
                code,
            )
            .await?
        {
            for label in ["Next", "Continue", "Verify", "Confirm"] {
                if auto.tap_element(Strategy::AccessibilityId, label).await? {
                    break;
                }
            }
        }
        clock.rest(Duration::from_secs(3)).await;
        Ok(!clock.stopped())
    }

    async fn skip(&self, device: &Device, reason: &str) {
        self.events
            .emit(
                NewEvent::new(
                    Category::Scheduler,
                    Severity::Warning,
                    event_type::CREATION_SKIPPED,
                    format!("Account creation skipped: {reason}"),
                )
                .device(&device.id)
                .context(json!({"reason": reason})),
            )
            .await;
    }

    async fn fail(
        &self,
        device: &Device,
        platform: Platform,
        username: &str,
        step: &str,
        reason: &str,
    ) {
        warn!(platform = %platform, username, step, reason, "Account creation failed");
        self.events
            .emit(
                NewEvent::new(
                    Category::Account,
                    Severity::Error,
                    event_type::ACCOUNT_CREATION_FAILED,
                    format!("{platform} account creation failed at {step}"),
                )
                .device(&device.id)
                .context(json!({
                    "platform": platform.as_str(),
                    "username": username,
                    "step": step,
                    "reason": reason,
                })),
            )
            .await;
    }
}

/// Plus-addressed mailbox for a new account, derived from the IMAP login.
fn mailbox_address(imap: &ImapSettings, username: &str) -> String {
    if let Some((local, domain)) = imap.username.split_once('@') {
        format!("{local}+{username}@{domain}")
    } else {
        format!("{username}@example.invalid")
    }
}

/// Random 16-character password with guaranteed class coverage.
fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let mut password: String = (&mut rng)
        .sample_iter(Alphanumeric)
        .take(13)
        .map(char::from)
        .collect();
    // Platforms insist on at least one digit and one symbol
    password.push(char::from(b'0' + rng.gen_range(0..10u8)));
    let symbols = ['!', '#', '$', '%', '&', '*', '?'];
    password.push(symbols[rng.gen_range(0..symbols.len())]);
    password.push(char::from(b'A' + rng.gen_range(0..26u8)));
    password
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn passwords_are_long_and_varied() {
        for _ in 0..50 {
            let p = generate_password();
            assert_eq!(p.len(), 16);
            assert!(p.chars().any(|c| c.is_ascii_digit()));
            assert!(p.chars().any(|c| !c.is_ascii_alphanumeric()));
        }
        assert_ne!(generate_password(), generate_password());
    }

    #[test]
    fn mailbox_uses_plus_addressing() {
        let imap = ImapSettings {
            host: "imap.example.com".into(),
            port: 993,
            username: "ops@example.com".into(),
            password: "p".into(),
        };
        assert_eq!(mailbox_address(&imap, "cash123"), "ops+cash123@example.com");
    }
}
