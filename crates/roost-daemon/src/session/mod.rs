//! Session runner: the uninstall → reinstall → login → warm pipeline.
//!
//! Each warming session starts from a fresh install because every reinstall
//! rotates the per-vendor installation identity the platform sees; reusing
//! one identity across accounts links them. The runner drives the pipeline
//! with explicit outcomes and bounded budgets, and materializes every failure
//! as an event.

pub(crate) mod lifecycle;
mod login;
mod runner;

pub use lifecycle::{app_display_name, bundle_id};
pub use login::Credentials;
pub use runner::{classify_outcome, AbortReason, SessionOutcome, SessionRunner};

use crate::agent::AgentError;
use crate::storage::DatabaseError;

/// Errors raised while driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("App reinstall failed: {0}")]
    Install(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Credential decryption failed: {0}")]
    Decryption(String),

    #[error("Warming failed: {0}")]
    Warming(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
