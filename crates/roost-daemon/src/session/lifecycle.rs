//! App lifecycle: terminate, uninstall, reinstall from the App Store.
//!
//! Uninstalling before every session clears the per-vendor installation
//! identity; the uninstall endpoint is tried first, with a springboard
//! long-press fallback for agents that lack it.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::agent::{AgentError, Automation, Strategy, UiDriver, APP_STATE_NOT_RUNNING};
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::storage::Platform;
use crate::warming::SessionClock;

const APP_STORE_BUNDLE: &str = "com.apple.AppStore";

/// How long to wait for an App Store install to finish.
const INSTALL_WAIT: Duration = Duration::from_secs(120);

/// Bundle id for a warmable platform's app.
pub const fn bundle_id(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => crate::warming::TIKTOK_BUNDLE,
        Platform::Instagram => crate::warming::INSTAGRAM_BUNDLE,
        Platform::Youtube => crate::warming::YOUTUBE_BUNDLE,
        Platform::Reddit => crate::warming::REDDIT_BUNDLE,
        Platform::XTwitter => crate::warming::X_TWITTER_BUNDLE,
    }
}

/// App Store display name, used for install search.
pub const fn app_display_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => "TikTok",
        Platform::Instagram => "Instagram",
        Platform::Youtube => "YouTube",
        Platform::Reddit => "Reddit",
        Platform::XTwitter => "X",
    }
}

/// Terminate the platform app if running. Failures only warn; a dead agent
/// will fail loudly at the next step anyway.
pub async fn ensure_terminated(driver: &dyn UiDriver, platform: Platform) {
    if let Err(e) = driver.terminate_app(bundle_id(platform)).await {
        warn!(platform = %platform, error = %e, "Could not terminate app");
    }
}

/// Delete the platform app to reset the install identity.
pub async fn delete_app(
    driver: &dyn UiDriver,
    events: &EventSink,
    platform: Platform,
    device_id: &str,
) -> Result<bool, AgentError> {
    let bundle = bundle_id(platform);

    driver.terminate_app(bundle).await.ok();
    tokio::time::sleep(Duration::from_secs(1)).await;
    driver.press_button("home").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Preferred path: the agent's uninstall endpoint
    match driver.uninstall_app(bundle).await {
        Ok(true) => {
            info!(platform = %platform, bundle, "App deleted");
            events
                .emit(
                    NewEvent::new(
                        Category::Device,
                        Severity::Info,
                        event_type::APP_DELETED,
                        format!("Deleted {platform} app for install-identity reset"),
                    )
                    .device(device_id)
                    .context(json!({"platform": platform.as_str(), "bundle_id": bundle})),
                )
                .await;
            return Ok(true);
        }
        Ok(false) => {
            warn!(platform = %platform, "Uninstall endpoint unavailable, trying springboard");
        }
        Err(e) => {
            warn!(platform = %platform, error = %e, "Uninstall endpoint failed, trying springboard");
        }
    }

    // Fallback: long-press the icon into jiggle mode and confirm deletion
    let deleted = springboard_delete(driver, platform).await?;
    if deleted {
        events
            .emit(
                NewEvent::new(
                    Category::Device,
                    Severity::Info,
                    event_type::APP_DELETED,
                    format!("Deleted {platform} app via springboard"),
                )
                .device(device_id)
                .context(json!({"platform": platform.as_str(), "method": "springboard"})),
            )
            .await;
    } else {
        events
            .emit(
                NewEvent::new(
                    Category::Device,
                    Severity::Error,
                    event_type::APP_DELETE_FAILED,
                    format!("Failed to delete {platform} app"),
                )
                .device(device_id)
                .context(json!({"platform": platform.as_str()})),
            )
            .await;
    }
    Ok(deleted)
}

async fn springboard_delete(driver: &dyn UiDriver, platform: Platform) -> Result<bool, AgentError> {
    driver.press_button("home").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    driver.press_button("home").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let name = app_display_name(platform);
    let Some(icon) = driver.find_element(Strategy::AccessibilityId, name).await? else {
        warn!(app = name, "App icon not found on springboard");
        return Ok(false);
    };

    driver.touch_and_hold(&icon, 3.0).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let auto = Automation::new(driver);
    for label in ["Remove App", "Delete App"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            tokio::time::sleep(Duration::from_secs(1)).await;
            break;
        }
    }
    for label in ["Delete App", "Delete"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Install the platform app from the App Store by searching for it.
///
/// Assumes the store is signed in on the device. Bounded by both the overhead
/// clock and a 120-second install wait.
pub async fn install_from_app_store(
    driver: &dyn UiDriver,
    events: &EventSink,
    clock: &mut SessionClock,
    platform: Platform,
    device_id: &str,
) -> Result<bool, AgentError> {
    let name = app_display_name(platform);
    let bundle = bundle_id(platform);
    let auto = Automation::new(driver);

    driver.activate_app(APP_STORE_BUNDLE).await?;
    if !clock.rest(Duration::from_secs(3)).await {
        return Ok(false);
    }
    auto.dismiss_popups(2).await?;

    if auto.tap_element(Strategy::AccessibilityId, "Search").await?
        && !clock.rest(Duration::from_secs(2)).await
    {
        return Ok(false);
    }

    let Some(field) = driver
        .find_element(Strategy::ClassChain, "**/XCUIElementTypeSearchField")
        .await?
    else {
        warn!("App Store search field not found");
        emit_install_failed(events, platform, device_id, "search field not found").await;
        return Ok(false);
    };
    driver.click_element(&field).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    driver.set_element_value(&field, name).await?;
    if !clock.rest(Duration::from_secs(1)).await {
        return Ok(false);
    }
    auto.tap_element(Strategy::AccessibilityId, "search").await?;
    if !clock.rest(Duration::from_secs(3)).await {
        return Ok(false);
    }

    // GET for first installs, the cloud badge for redownloads
    let mut tapped = false;
    for label in ["GET", "Get", "INSTALL", "Install"] {
        if auto.tap_element(Strategy::AccessibilityId, label).await? {
            tapped = true;
            break;
        }
    }
    if !tapped {
        auto.tap_element(
            Strategy::PredicateString,
            r#"name CONTAINS "download" OR name CONTAINS "cloud""#,
        )
        .await?;
    }

    info!(app = name, "Waiting for install");
    let wait_budget = INSTALL_WAIT.min(clock.remaining());
    let deadline = tokio::time::Instant::now() + wait_budget;
    while tokio::time::Instant::now() < deadline {
        if driver.app_state(bundle).await? >= APP_STATE_NOT_RUNNING {
            info!(app = name, "Install complete");
            events
                .emit(
                    NewEvent::new(
                        Category::Device,
                        Severity::Info,
                        event_type::APP_INSTALLED,
                        format!("Installed {platform} from the App Store"),
                    )
                    .device(device_id)
                    .context(json!({"platform": platform.as_str(), "bundle_id": bundle})),
                )
                .await;
            driver.press_button("home").await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            return Ok(true);
        }
        if !clock.rest(Duration::from_secs(5)).await {
            break;
        }
    }

    warn!(app = name, "Timed out waiting for install");
    emit_install_failed(events, platform, device_id, "install wait timed out").await;
    Ok(false)
}

async fn emit_install_failed(
    events: &EventSink,
    platform: Platform,
    device_id: &str,
    reason: &str,
) {
    events
        .emit(
            NewEvent::new(
                Category::Device,
                Severity::Error,
                event_type::INSTALL_FAILED,
                format!("Failed to install {platform} from the App Store"),
            )
            .device(device_id)
            .context(json!({"platform": platform.as_str(), "reason": reason})),
        )
        .await;
}
