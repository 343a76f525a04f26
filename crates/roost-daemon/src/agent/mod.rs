//! HTTP client for the per-device automation agent.
//!
//! The agent exposes a W3C-WebDriver-compatible surface on the device's
//! tunnelled port. The daemon drives it with two clients per endpoint: a
//! short-timeout one for gestures (which execute fast on-device even when the
//! agent is slow to answer) and a long-timeout one for heavy operations like
//! page-source reads and screenshots.

mod automation;
mod client;
mod driver;

pub use automation::Automation;
pub use client::{AgentClient, AgentSession, APP_STATE_FOREGROUND, APP_STATE_NOT_RUNNING};
pub use driver::{ScreenSize, Strategy, UiDriver};

/// Errors from the automation agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Agent returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected agent response: {0}")]
    Protocol(String),
}
