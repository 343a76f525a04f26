//! Database models for the roost daemon.

use serde::{Deserialize, Serialize};

/// Content vertical row. Relationship attributes are immutable here;
/// mutation happens through external tooling.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Niche {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub tier: i64,
    pub status: String,
    pub created_at: i64,
}

/// Physical device row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub udid: String,
    pub automation_host: String,
    pub automation_port: i64,
    pub status: String,
    pub connected_since: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    /// Base URL of this device's automation agent.
    pub fn agent_url(&self) -> String {
        format!("http://{}:{}", self.automation_host, self.automation_port)
    }
}

/// Managed account row. Sensitive fields are codec tokens, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub platform: String,
    pub username: String,
    pub email_enc: Option<String>,
    pub password_enc: Option<String>,
    pub totp_secret_enc: Option<String>,
    pub proxy_credentials: Option<String>,
    pub niche_id: Option<String>,
    pub device_id: Option<String>,
    pub current_state: String,
    pub warming_day_count: i64,
    pub followers: i64,
    pub following: i64,
    pub bio: Option<String>,
    pub last_activity_at: Option<i64>,
    pub last_warmed_at: Option<i64>,
    pub last_post_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn state(&self) -> Option<AccountState> {
        AccountState::parse(&self.current_state)
    }
}

/// One completed (or failed) warming cycle. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WarmingProgress {
    pub id: String,
    pub account_id: String,
    pub device_id: String,
    pub platform: String,
    pub warming_phase: i64,
    pub warming_day: i64,
    pub session_data: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

/// Structured event row. Append-only, monotonic id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemEvent {
    pub id: i64,
    pub timestamp: i64,
    pub category: String,
    pub severity: String,
    pub event_type: String,
    pub device_id: Option<String>,
    pub account_id: Option<String>,
    pub message: String,
    pub context: String,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
}

/// Social platform enum. Only TikTok and Instagram are operated by the
/// scheduler; the rest exist as distribution targets and future warmers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
    Reddit,
    XTwitter,
}

impl Platform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Reddit => "reddit",
            Self::XTwitter => "x_twitter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tiktok" => Some(Self::Tiktok),
            "instagram" => Some(Self::Instagram),
            "youtube" | "youtube_shorts" => Some(Self::Youtube),
            "reddit" => Some(Self::Reddit),
            "twitter" | "x_twitter" => Some(Self::XTwitter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Device status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Active,
    Maintenance,
    Failed,
    Disconnected,
}

impl DeviceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account lifecycle state.
///
/// The ramp (`created → warming_p1 → warming_p2 → warming_p3 → active`) is
/// driven by the warming day count; the exception states are reachable from
/// any warming or active state but only through the validated transition API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountState {
    Created,
    WarmingP1,
    WarmingP2,
    WarmingP3,
    Active,
    Resting,
    Cooldown,
    Flagged,
    Restricted,
    Shadowbanned,
    Suspended,
    Banned,
}

impl AccountState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WarmingP1 => "warming_p1",
            Self::WarmingP2 => "warming_p2",
            Self::WarmingP3 => "warming_p3",
            Self::Active => "active",
            Self::Resting => "resting",
            Self::Cooldown => "cooldown",
            Self::Flagged => "flagged",
            Self::Restricted => "restricted",
            Self::Shadowbanned => "shadowbanned",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "warming_p1" => Some(Self::WarmingP1),
            "warming_p2" => Some(Self::WarmingP2),
            "warming_p3" => Some(Self::WarmingP3),
            "active" => Some(Self::Active),
            "resting" => Some(Self::Resting),
            "cooldown" => Some(Self::Cooldown),
            "flagged" => Some(Self::Flagged),
            "restricted" => Some(Self::Restricted),
            "shadowbanned" => Some(Self::Shadowbanned),
            "suspended" => Some(Self::Suspended),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }

    /// State an account should hold after `day_count` successful warming
    /// sessions: days 1-3 phase 1, 4-7 phase 2, 8-14 phase 3, 15+ active.
    pub const fn for_day(day_count: i64) -> Self {
        if day_count <= 3 {
            Self::WarmingP1
        } else if day_count <= 7 {
            Self::WarmingP2
        } else if day_count <= 14 {
            Self::WarmingP3
        } else {
            Self::Active
        }
    }

    const fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::Flagged | Self::Restricted | Self::Shadowbanned | Self::Suspended | Self::Banned
        )
    }

    const fn is_warming(&self) -> bool {
        matches!(self, Self::WarmingP1 | Self::WarmingP2 | Self::WarmingP3)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Staying in place is always allowed (a warming session that does not
    /// cross a phase boundary rewrites the same state).
    pub fn allows(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (Self::Created, Self::WarmingP1) => true,
            (Self::WarmingP1, Self::WarmingP2) => true,
            (Self::WarmingP2, Self::WarmingP3) => true,
            (Self::WarmingP3, Self::Active) => true,
            (Self::Active, Self::Resting | Self::Cooldown) => true,
            (Self::Resting | Self::Cooldown, Self::Active) => true,
            (from, to) if (from.is_warming() || *from == Self::Active) && to.is_exception() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
