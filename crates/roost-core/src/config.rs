//! Runtime configuration loaded once from the environment at startup.
//!
//! Address, database path, and log options come in through CLI flags (with
//! env fallbacks) in the daemon binary; everything secret or operational
//! lives here. The master encryption key is required; the process refuses
//! to start without it. Provider credentials are optional and gate only the
//! account-creation runner.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Environment variable holding the base64-encoded 32-byte master key.
pub const MASTER_KEY_ENV: &str = "ROOST_MASTER_KEY";

/// Complete roost runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base64-encoded 32-byte AES key for the credential codec.
    pub master_key: String,
    /// Session/scheduler timing knobs.
    pub budgets: SessionBudgets,
    /// External verification providers (creation runner only).
    pub providers: ProviderConfig,
}

/// Timing budgets for sessions and the scheduler loop.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionBudgets {
    /// Wall-clock budget for uninstall + reinstall + login.
    pub overhead_secs: u64,
    /// Exact warming duration per session.
    pub warming_secs: u64,
    /// Hard deadline for a whole session.
    pub session_total_secs: u64,
    /// Cooldown between sessions on one device.
    pub cooldown_secs: u64,
    /// Idle sleep when no task is available.
    pub idle_secs: u64,
    /// Initial backoff when the automation agent is unreachable.
    pub agent_backoff_secs: u64,
    /// Backoff ceiling for an unreachable agent.
    pub agent_backoff_max_secs: u64,
}

impl Default for SessionBudgets {
    fn default() -> Self {
        Self {
            overhead_secs: 15 * 60,
            warming_secs: 30 * 60,
            session_total_secs: 45 * 60,
            cooldown_secs: 30,
            idle_secs: 30,
            agent_backoff_secs: 60,
            agent_backoff_max_secs: 15 * 60,
        }
    }
}

impl SessionBudgets {
    pub fn overhead(&self) -> Duration {
        Duration::from_secs(self.overhead_secs)
    }

    pub fn warming(&self) -> Duration {
        Duration::from_secs(self.warming_secs)
    }

    pub fn session_total(&self) -> Duration {
        Duration::from_secs(self.session_total_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

/// IMAP mailbox credentials for email verification polling.
#[derive(Debug, Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Optional external provider credentials.
///
/// Account creation is skipped (with a warning event) when any required
/// provider is absent; nothing here is ever fatal.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub captcha_api_key: Option<String>,
    pub sms_api_key: Option<String>,
    pub imap: Option<ImapSettings>,
}

impl ProviderConfig {
    /// True when every provider needed by the creation flow is configured.
    pub fn creation_ready(&self) -> bool {
        self.captcha_api_key.is_some() && self.sms_api_key.is_some() && self.imap.is_some()
    }

    /// Names of the providers that are missing, for event context.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.captcha_api_key.is_none() {
            out.push("captcha");
        }
        if self.sms_api_key.is_none() {
            out.push("sms");
        }
        if self.imap.is_none() {
            out.push("imap");
        }
        out
    }
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// Fails when the master key is absent or not valid base64 for 32 bytes;
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let master_key = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::Config(format!("{MASTER_KEY_ENV} is not set")))?;
        validate_master_key(&master_key)?;

        Ok(Self {
            master_key,
            budgets: SessionBudgets::default(),
            providers: providers_from_env(),
        })
    }

    /// Construct a config with an explicit key (tests, embedding).
    pub fn with_master_key(master_key: impl Into<String>) -> Result<Self> {
        let master_key = master_key.into();
        validate_master_key(&master_key)?;
        Ok(Self {
            master_key,
            budgets: SessionBudgets::default(),
            providers: ProviderConfig::default(),
        })
    }
}

fn validate_master_key(raw: &str) -> Result<()> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| Error::Config(format!("{MASTER_KEY_ENV} is not valid base64: {e}")))?;
    if decoded.len() != 32 {
        return Err(Error::Config(format!(
            "{MASTER_KEY_ENV} must decode to 32 bytes, got {}",
            decoded.len()
        )));
    }
    Ok(())
}

fn providers_from_env() -> ProviderConfig {
    let imap = match (
        std::env::var("ROOST_IMAP_HOST").ok(),
        std::env::var("ROOST_IMAP_USERNAME").ok(),
        std::env::var("ROOST_IMAP_PASSWORD").ok(),
    ) {
        (Some(host), Some(username), Some(password)) => Some(ImapSettings {
            host,
            port: std::env::var("ROOST_IMAP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(993),
            username,
            password,
        }),
        _ => None,
    };

    ProviderConfig {
        captcha_api_key: std::env::var("CAPSOLVER_API_KEY").ok().filter(|v| !v.is_empty()),
        sms_api_key: std::env::var("TEXTVERIFIED_API_KEY").ok().filter(|v| !v.is_empty()),
        imap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets_sum_to_session_total() {
        let b = SessionBudgets::default();
        assert_eq!(b.overhead_secs + b.warming_secs, b.session_total_secs);
    }

    #[test]
    fn master_key_must_be_32_bytes() {
        use base64::Engine;
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(Config::with_master_key(short).is_err());

        let ok = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        assert!(Config::with_master_key(ok).is_ok());
    }

    #[test]
    fn master_key_must_be_base64() {
        assert!(Config::with_master_key("not base64 !!!").is_err());
    }

    #[test]
    fn provider_gaps_are_reported() {
        let p = ProviderConfig::default();
        assert!(!p.creation_ready());
        assert_eq!(p.missing(), vec!["captcha", "sms", "imap"]);

        let p = ProviderConfig {
            captcha_api_key: Some("k".into()),
            sms_api_key: Some("k".into()),
            imap: Some(ImapSettings {
                host: "imap.example.com".into(),
                port: 993,
                username: "u".into(),
                password: "p".into(),
            }),
        };
        assert!(p.creation_ready());
        assert!(p.missing().is_empty());
    }
}
