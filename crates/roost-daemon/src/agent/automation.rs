//! High-level automation helpers over a [`UiDriver`].

use std::time::Duration;

use rand::Rng;
use tracing::info;

use super::driver::{Strategy, UiDriver};
use super::AgentError;

/// In-app dismiss labels tried when clearing popups.
const DISMISS_LABELS: [&str; 7] = [
    "Not Now",
    "Skip",
    "Later",
    "Got it",
    "Dismiss",
    "Close",
    "No thanks",
];

/// Convenience wrapper adding composite actions to a driver.
pub struct Automation<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> Automation<'a> {
    pub fn new(driver: &'a dyn UiDriver) -> Self {
        Self { driver }
    }

    /// Swipe up (next video / scroll down).
    pub async fn swipe_up(&self, duration_secs: f64) -> Result<(), AgentError> {
        let size = self.driver.screen_size();
        let cx = size.width / 2;
        self.driver
            .swipe(
                (cx, size.height * 3 / 4),
                (cx, size.height / 4),
                duration_secs,
            )
            .await
    }

    /// Double-tap screen center (like on feed apps), settling afterwards the
    /// way a thumb would.
    pub async fn like_current(&self) -> Result<(), AgentError> {
        let size = self.driver.screen_size();
        self.driver
            .double_tap(size.width / 2, size.height / 2)
            .await?;
        self.human_delay(500, 1500).await;
        Ok(())
    }

    /// Find and click an element. Returns true when found.
    pub async fn tap_element(&self, strategy: Strategy, value: &str) -> Result<bool, AgentError> {
        if let Some(id) = self.driver.find_element(strategy, value).await? {
            self.driver.click_element(&id).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Find a field, click it, and type text into it. Returns true when found.
    pub async fn type_into(
        &self,
        strategy: Strategy,
        value: &str,
        text: &str,
    ) -> Result<bool, AgentError> {
        if let Some(id) = self.driver.find_element(strategy, value).await? {
            self.driver.click_element(&id).await?;
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.driver.set_element_value(&id, text).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Try to clear system alerts and in-app popups.
    ///
    /// Tracking/notification prompts get dismissed; everything else gets
    /// accepted. Returns the number of dialogs cleared.
    pub async fn dismiss_popups(&self, max_attempts: u32) -> Result<u32, AgentError> {
        let mut dismissed = 0;
        'attempts: for _ in 0..max_attempts {
            if let Some(text) = self.driver.alert_text().await? {
                info!(alert = %text.chars().take(80).collect::<String>(), "Alert");
                let lower = text.to_lowercase();
                if ["allow", "notif", "track"].iter().any(|kw| lower.contains(kw)) {
                    self.driver.dismiss_alert().await?;
                } else {
                    self.driver.accept_alert().await?;
                }
                dismissed += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }

            for label in DISMISS_LABELS {
                if self.tap_element(Strategy::AccessibilityId, label).await? {
                    info!(label, "Dismissed popup");
                    dismissed += 1;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue 'attempts;
                }
            }
            break;
        }
        Ok(dismissed)
    }

    /// Pause for a human-feeling random interval.
    pub async fn human_delay(&self, min_ms: u64, max_ms: u64) {
        let wait = rand::thread_rng().gen_range(min_ms..=max_ms);
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }
}
