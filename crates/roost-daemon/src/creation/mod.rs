//! Account creation runner.
//!
//! Fallback work for a device with no warming task: create one new account
//! on the (platform, niche) pair that needs it most. The full flow drives
//! the on-device signup screens, solves CAPTCHAs through the external
//! solver, and verifies email and SMS through the configured providers.
//! Partial progress is always discarded: an account row exists only when
//! the whole flow succeeded.

mod runner;
mod username;

pub use runner::CreationRunner;
pub use username::synthesize as synthesize_username;

use crate::agent::AgentError;
use crate::storage::DatabaseError;
use crate::verify::{EmailVerifyError, VerifyError};

/// Errors from the creation flow.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Email(#[from] EmailVerifyError),

    #[error("Crypto error: {0}")]
    Crypto(String),
}
