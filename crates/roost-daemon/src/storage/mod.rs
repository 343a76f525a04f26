//! SQLite storage for the roost daemon.
//!
//! Provides persistence for niches, devices, accounts, and warming progress,
//! plus the contention-safe warming-task claim.

mod db;
mod models;
mod queries;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use queries::{with_retries, CreationTarget, WarmingOutcome, WARMABLE_PLATFORMS};
