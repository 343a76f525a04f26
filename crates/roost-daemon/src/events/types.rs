//! Event taxonomy: categories, severities, and canonical event types.

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scheduler,
    Device,
    Account,
    Auth,
}

impl Category {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Device => "device",
            Self::Account => "account",
            Self::Auth => "auth",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical event type strings. Emit sites use these constants so the
/// queryable taxonomy cannot drift.
pub mod event_type {
    // scheduler
    pub const SCHEDULER_STARTED: &str = "scheduler_started";
    pub const SCHEDULER_STOPPING: &str = "scheduler_stopping";
    pub const SCHEDULER_STOPPED: &str = "scheduler_stopped";
    pub const NO_DEVICES: &str = "no_devices";
    pub const WARMING_STARTED: &str = "warming_started";
    pub const WARMING_COMPLETE: &str = "warming_complete";
    pub const WARMING_FAILED: &str = "warming_failed";
    pub const INSTALL_FAILED: &str = "install_failed";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const CREATION_STARTED: &str = "creation_started";
    pub const CREATION_SKIPPED: &str = "creation_skipped";
    pub const DEVICE_LOOP_ERROR: &str = "device_loop_error";

    // device
    pub const DEVICE_DISCONNECTED: &str = "device_disconnected";
    pub const APP_DELETED: &str = "app_deleted";
    pub const APP_DELETE_FAILED: &str = "app_delete_failed";
    pub const APP_INSTALLED: &str = "app_installed";

    // account
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const ACCOUNT_CREATION_STARTED: &str = "account_creation_started";
    pub const ACCOUNT_CREATED: &str = "account_created";
    pub const ACCOUNT_CREATION_FAILED: &str = "account_creation_failed";
    pub const DECRYPTION_FAILED: &str = "decryption_failed";

    // auth
    pub const CAPTCHA_FAILED: &str = "captcha_failed";
}
