//! Platform login flows: email + password + TOTP against a fresh install.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::agent::{AgentError, Automation, Strategy, UiDriver};
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::storage::{Account, Platform};
use crate::warming::SessionClock;

use super::lifecycle::bundle_id;
use super::SessionError;

/// Decrypted login material for one account. Dropped as soon as the login
/// step finishes.
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub totp_secret: Option<String>,
}

impl Credentials {
    /// Decrypt an account's stored credential tokens.
    pub fn decrypt(
        codec: &roost_crypto::CredentialCodec,
        account: &Account,
    ) -> Result<Self, SessionError> {
        let email_enc = account
            .email_enc
            .as_deref()
            .ok_or_else(|| SessionError::Decryption("account has no email token".into()))?;
        let password_enc = account
            .password_enc
            .as_deref()
            .ok_or_else(|| SessionError::Decryption("account has no password token".into()))?;

        let email = codec
            .decrypt_str(email_enc)
            .map_err(|e| SessionError::Decryption(e.to_string()))?;
        let password = codec
            .decrypt_str(password_enc)
            .map_err(|e| SessionError::Decryption(e.to_string()))?;
        let totp_secret = match account.totp_secret_enc.as_deref() {
            Some(token) => Some(
                codec
                    .decrypt_str(token)
                    .map_err(|e| SessionError::Decryption(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            email,
            password,
            totp_secret,
        })
    }
}

/// Log into a platform account. Returns false when the flow did not reach a
/// logged-in feed; the corresponding event is emitted either way.
pub async fn login_account(
    driver: &dyn UiDriver,
    events: &EventSink,
    clock: &mut SessionClock,
    account: &Account,
    platform: Platform,
    creds: &Credentials,
) -> Result<bool, AgentError> {
    let ok = match platform {
        Platform::Tiktok => login_tiktok(driver, clock, creds).await?,
        Platform::Instagram => login_instagram(driver, clock, creds).await?,
        other => {
            warn!(platform = %other, "No login flow for platform");
            false
        }
    };

    let mut event = if ok {
        info!(platform = %platform, username = %account.username, "Login successful");
        NewEvent::new(
            Category::Account,
            Severity::Info,
            event_type::LOGIN_SUCCESS,
            format!("{platform} login successful for {}", account.username),
        )
        .context(json!({"platform": platform.as_str(), "username": account.username}))
    } else {
        warn!(platform = %platform, username = %account.username, "Login failed");
        NewEvent::new(
            Category::Account,
            Severity::Error,
            event_type::LOGIN_FAILED,
            format!("{platform} login failed for {}", account.username),
        )
        .context(json!({
            "platform": platform.as_str(),
            "username": account.username,
            "step": "login",
        }))
    };
    event = event.account(&account.id);
    if let Some(device_id) = &account.device_id {
        event = event.device(device_id);
    }
    events.emit(event).await;
    Ok(ok)
}

async fn login_tiktok(
    driver: &dyn UiDriver,
    clock: &mut SessionClock,
    creds: &Credentials,
) -> Result<bool, AgentError> {
    let auto = Automation::new(driver);

    driver.activate_app(bundle_id(Platform::Tiktok)).await?;
    if !clock.rest(Duration::from_secs(4)).await {
        return Ok(false);
    }
    auto.dismiss_popups(3).await?;

    for label in ["Use phone / email / username", "Log in", "Log In"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            if !clock.rest(Duration::from_secs(2)).await {
                return Ok(false);
            }
            break;
        }
    }
    for label in ["Email / Username", "Use email/username"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            if !clock.rest(Duration::from_secs(1)).await {
                return Ok(false);
            }
            break;
        }
    }

    auto.type_into(
        Strategy::PredicateString,
        r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "email" OR name CONTAINS "Email" OR placeholderValue CONTAINS "email")"#,
        &creds.email,
    )
    .await?;
    auto.type_into(
        Strategy::PredicateString,
        r#"type == "XCUIElementTypeSecureTextField""#,
        &creds.password,
    )
    .await?;

    for label in ["Log in", "Log In", "Login"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            break;
        }
    }
    if !clock.rest(Duration::from_secs(5)).await {
        return Ok(false);
    }

    // TOTP challenge, when the platform asks for the second factor
    if let Some(secret) = &creds.totp_secret {
        let field = driver
            .find_element(
                Strategy::PredicateString,
                r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "code" OR name CONTAINS "verification")"#,
            )
            .await?;
        if let Some(field_id) = field {
            match roost_crypto::totp::current_code(secret) {
                Ok(code) => {
                    driver.set_element_value(&field_id, &code).await?;
                    if !clock.rest(Duration::from_secs(1)).await {
                        return Ok(false);
                    }
                    for label in ["Verify", "Submit", "Confirm", "Next"] {
                        if auto.tap_element(Strategy::AccessibilityId, label).await? {
                            break;
                        }
                    }
                    if !clock.rest(Duration::from_secs(3)).await {
                        return Ok(false);
                    }
                }
                Err(e) => warn!(error = %e, "Could not derive TOTP code"),
            }
        }
    }

    auto.dismiss_popups(3).await?;
    if !clock.rest(Duration::from_secs(2)).await {
        return Ok(false);
    }

    // If the feed scrolls, we are in
    auto.swipe_up(0.4).await?;
    clock.rest(Duration::from_secs(1)).await;
    Ok(!clock.stopped())
}

async fn login_instagram(
    driver: &dyn UiDriver,
    clock: &mut SessionClock,
    creds: &Credentials,
) -> Result<bool, AgentError> {
    let auto = Automation::new(driver);

    driver.activate_app(bundle_id(Platform::Instagram)).await?;
    if !clock.rest(Duration::from_secs(4)).await {
        return Ok(false);
    }
    auto.dismiss_popups(3).await?;

    for label in ["I already have an account", "Log in", "Log In"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            if !clock.rest(Duration::from_secs(2)).await {
                return Ok(false);
            }
            break;
        }
    }

    auto.type_into(
        Strategy::PredicateString,
        r#"type == "XCUIElementTypeTextField" AND (name CONTAINS "Username" OR name CONTAINS "email" OR name CONTAINS "Phone")"#,
        &creds.email,
    )
    .await?;
    auto.type_into(
        Strategy::PredicateString,
        r#"type == "XCUIElementTypeSecureTextField""#,
        &creds.password,
    )
    .await?;

    for label in ["Log in", "Log In", "Login"] {
        let selector =
            format!(r#"label == "{label}" AND type == "XCUIElementTypeButton""#);
        if auto.tap_element(Strategy::PredicateString, &selector).await? {
            break;
        }
    }
    if !clock.rest(Duration::from_secs(5)).await {
        return Ok(false);
    }

    // Save-login, notification, and similar prompts
    auto.dismiss_popups(5).await?;
    if !clock.rest(Duration::from_secs(2)).await {
        return Ok(false);
    }

    if driver
        .find_element(Strategy::AccessibilityId, "Home")
        .await?
        .is_some()
    {
        return Ok(true);
    }

    // Fallback check: the feed accepts a scroll
    auto.swipe_up(0.4).await?;
    clock.rest(Duration::from_secs(1)).await;
    Ok(!clock.stopped())
}
