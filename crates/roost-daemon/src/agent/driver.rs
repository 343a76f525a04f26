//! The UI-driver seam between automation flows and the agent transport.
//!
//! Session, warming, and creation flows drive this trait rather than the
//! HTTP client directly, so they can run against a scripted fake in tests.

use async_trait::async_trait;

use super::AgentError;

/// Element lookup strategies, in preferred order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AccessibilityId,
    PredicateString,
    ClassChain,
    Xpath,
}

impl Strategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessibilityId => "accessibility id",
            Self::PredicateString => "predicate string",
            Self::ClassChain => "class chain",
            Self::Xpath => "xpath",
        }
    }
}

/// Device screen geometry, cached at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: i64,
    pub height: i64,
}

impl ScreenSize {
    /// Fallback geometry when the agent cannot report it.
    pub const DEFAULT: Self = Self {
        width: 393,
        height: 852,
    };
}

/// Abstract UI surface of one automation session on one device.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Bring an app to the foreground by bundle id.
    async fn activate_app(&self, bundle_id: &str) -> Result<(), AgentError>;

    /// Terminate an app by bundle id.
    async fn terminate_app(&self, bundle_id: &str) -> Result<(), AgentError>;

    /// Uninstall an app. Returns false when the agent lacks the endpoint.
    async fn uninstall_app(&self, bundle_id: &str) -> Result<bool, AgentError>;

    /// App state: 1=not running, 2=background, 3=suspended, 4=foreground.
    async fn app_state(&self, bundle_id: &str) -> Result<i64, AgentError>;

    /// Find a single element; None when absent.
    async fn find_element(
        &self,
        strategy: Strategy,
        value: &str,
    ) -> Result<Option<String>, AgentError>;

    async fn click_element(&self, element_id: &str) -> Result<(), AgentError>;

    /// Type text into an element.
    async fn set_element_value(&self, element_id: &str, text: &str) -> Result<(), AgentError>;

    /// Long-press an element (springboard jiggle mode).
    async fn touch_and_hold(&self, element_id: &str, duration_secs: f64)
        -> Result<(), AgentError>;

    async fn tap(&self, x: i64, y: i64) -> Result<(), AgentError>;

    async fn double_tap(&self, x: i64, y: i64) -> Result<(), AgentError>;

    async fn swipe(
        &self,
        from: (i64, i64),
        to: (i64, i64),
        duration_secs: f64,
    ) -> Result<(), AgentError>;

    /// Cached screen geometry.
    fn screen_size(&self) -> ScreenSize;

    /// Text of the frontmost system alert, if any. Lightweight probe only.
    async fn alert_text(&self) -> Result<Option<String>, AgentError>;

    async fn accept_alert(&self) -> Result<bool, AgentError>;

    async fn dismiss_alert(&self) -> Result<bool, AgentError>;

    /// Press a hardware button: "home", "volumeUp", "volumeDown".
    async fn press_button(&self, name: &str) -> Result<(), AgentError>;

    /// Raw PNG screenshot (heavy; used for CAPTCHA solving).
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;
}
