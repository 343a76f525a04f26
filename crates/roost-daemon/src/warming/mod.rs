//! Warming behavior engine.
//!
//! A family of per-platform warmers that emulate organic consumption on a
//! freshly logged-in account. Each exposes two primitives, passive
//! consumption and rate-limited light engagement, picked by warming phase.
//! Warmers never touch the store; they return a [`WarmingReport`] to the
//! session runner. Every wait is a natural stop through [`SessionClock`],
//! which re-checks the elapsed budget and the shutdown signal, so a stop
//! request preempts a session within one wait.

mod clock;
mod instagram;
pub mod limits;
mod reddit;
mod tiktok;
mod x_twitter;
mod youtube;

use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;

use crate::agent::{AgentError, UiDriver};
use crate::storage::{AccountState, Platform};

pub use clock::SessionClock;
pub use instagram::{InstagramWarmer, BUNDLE as INSTAGRAM_BUNDLE};
pub use reddit::{RedditWarmer, BUNDLE as REDDIT_BUNDLE};
pub use tiktok::{TikTokWarmer, BUNDLE as TIKTOK_BUNDLE};
pub use x_twitter::{XTwitterWarmer, BUNDLE as X_TWITTER_BUNDLE};
pub use youtube::{YouTubeWarmer, BUNDLE as YOUTUBE_BUNDLE};

/// Niche-indexed hashtag sets used to train recommendations.
pub fn niche_hashtags(slug: &str) -> &'static [&'static str] {
    match slug {
        "personal_finance" => &[
            "personalfinance",
            "budgeting",
            "savingmoney",
            "investing",
            "financetips",
            "moneytips",
            "debtfree",
            "sidehustle",
        ],
        "ai_storytelling" => &[
            "aiart",
            "aistorytelling",
            "darkstories",
            "creepystories",
            "aifilm",
            "generativeart",
        ],
        "tech_ai_tools" => &[
            "aitools",
            "techtools",
            "productivity",
            "chatgpt",
            "artificial_intelligence",
            "techreview",
        ],
        "motivation" => &["motivation", "mindset", "discipline", "selfimprovement"],
        "true_crime" => &["truecrime", "crimestories", "unsolved", "mystery"],
        _ => &[],
    }
}

/// Discrete ramp stage: 1 passive, 2 light, 3 moderate, 4 active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarmingPhase {
    Passive,
    Light,
    Moderate,
    Active,
}

impl WarmingPhase {
    pub const fn number(&self) -> i64 {
        match self {
            Self::Passive => 1,
            Self::Light => 2,
            Self::Moderate => 3,
            Self::Active => 4,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Passive => "PASSIVE",
            Self::Light => "LIGHT",
            Self::Moderate => "MODERATE",
            Self::Active => "ACTIVE",
        }
    }

    /// Phase to run for an account in the given state.
    pub fn for_state(state: AccountState) -> Self {
        match state {
            AccountState::Created | AccountState::WarmingP1 => Self::Passive,
            AccountState::WarmingP2 => Self::Light,
            AccountState::WarmingP3 => Self::Moderate,
            _ => Self::Active,
        }
    }

    /// Phase 1 browses only; everything later mixes in engagement.
    pub const fn engages(&self) -> bool {
        !matches!(self, Self::Passive)
    }
}

impl std::fmt::Display for WarmingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Structured outcome of one warming run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmingReport {
    pub phase: String,
    pub videos_watched: u32,
    pub likes: u32,
    pub follows: u32,
    pub alerts_dismissed: u32,
    pub searches: u32,
    pub duration_secs: u64,
    pub interrupted: bool,
}

impl WarmingReport {
    pub fn for_phase(phase: WarmingPhase) -> Self {
        Self {
            phase: phase.name().to_string(),
            ..Self::default()
        }
    }
}

/// Run one warming cycle for a platform/phase on an open driver session.
///
/// The clock carries the warming budget (30 minutes in production) and the
/// shutdown signal; the warmer returns as soon as either fires.
pub async fn run_warming(
    driver: &dyn UiDriver,
    clock: &mut SessionClock,
    platform: Platform,
    phase: WarmingPhase,
    niche_hashtags: &[String],
) -> Result<WarmingReport, AgentError> {
    tracing::info!(platform = %platform, phase = %phase, "Warming run starting");

    match platform {
        Platform::Tiktok => {
            let warmer = TikTokWarmer::new(driver);
            if phase.engages() {
                // Occasionally train recommendations before the feed loop
                let mut rng = rand::rngs::StdRng::from_entropy();
                let searches = if !niche_hashtags.is_empty() && rng.gen_bool(0.25) {
                    warmer.search_niche_hashtags(clock, niche_hashtags).await?
                } else {
                    0
                };
                let mut report = warmer.light_engagement(clock, phase).await?;
                report.searches = searches;
                Ok(report)
            } else {
                warmer.passive_consumption(clock).await
            }
        }
        Platform::Instagram => {
            let warmer = InstagramWarmer::new(driver);
            if phase.engages() {
                warmer.light_engagement(clock, phase).await
            } else {
                warmer.passive_consumption(clock).await
            }
        }
        Platform::Reddit => {
            let warmer = RedditWarmer::new(driver);
            if phase.engages() {
                warmer.light_engagement(clock, phase).await
            } else {
                warmer.passive_consumption(clock).await
            }
        }
        Platform::Youtube => {
            let warmer = YouTubeWarmer::new(driver);
            if phase.engages() {
                warmer.light_engagement(clock, phase).await
            } else {
                warmer.passive_consumption(clock).await
            }
        }
        Platform::XTwitter => {
            let warmer = XTwitterWarmer::new(driver);
            if phase.engages() {
                warmer.light_engagement(clock, phase).await
            } else {
                warmer.passive_consumption(clock).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_numbers_and_names() {
        assert_eq!(WarmingPhase::Passive.number(), 1);
        assert_eq!(WarmingPhase::Active.number(), 4);
        assert_eq!(WarmingPhase::Passive.name(), "PASSIVE");
        assert_eq!(WarmingPhase::Moderate.name(), "MODERATE");
    }

    #[test]
    fn phase_for_state_mapping() {
        assert_eq!(
            WarmingPhase::for_state(AccountState::Created),
            WarmingPhase::Passive
        );
        assert_eq!(
            WarmingPhase::for_state(AccountState::WarmingP1),
            WarmingPhase::Passive
        );
        assert_eq!(
            WarmingPhase::for_state(AccountState::WarmingP2),
            WarmingPhase::Light
        );
        assert_eq!(
            WarmingPhase::for_state(AccountState::WarmingP3),
            WarmingPhase::Moderate
        );
        assert_eq!(
            WarmingPhase::for_state(AccountState::Active),
            WarmingPhase::Active
        );
    }

    #[test]
    fn only_passive_skips_engagement() {
        assert!(!WarmingPhase::Passive.engages());
        assert!(WarmingPhase::Light.engages());
        assert!(WarmingPhase::Moderate.engages());
        assert!(WarmingPhase::Active.engages());
    }
}
