//! TikTok warmer: swipe-up feed consumption with phase-gated engagement.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agent::{Automation, Strategy, UiDriver};
use crate::agent::AgentError;
use crate::storage::Platform;

use super::limits::{self, EngagementLimits, Pacing};
use super::{SessionClock, WarmingPhase, WarmingReport};

pub const BUNDLE: &str = "com.zhiliaoapp.musically";

pub struct TikTokWarmer<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> TikTokWarmer<'a> {
    pub fn new(driver: &'a dyn UiDriver) -> Self {
        Self { driver }
    }

    fn auto(&self) -> Automation<'_> {
        Automation::new(self.driver)
    }

    async fn open(&self, clock: &mut SessionClock, rng: &mut StdRng) -> Result<bool, AgentError> {
        self.driver.activate_app(BUNDLE).await?;
        if !clock.rest(Duration::from_secs_f64(rng.gen_range(3.0..=5.0))).await {
            return Ok(false);
        }
        self.probe_alert().await?;
        Ok(true)
    }

    /// Lightweight alert probe. No element search, the TikTok UI tree is too
    /// heavy for tight loops.
    async fn probe_alert(&self) -> Result<bool, AgentError> {
        if let Some(text) = self.driver.alert_text().await? {
            info!(alert = %text.chars().take(80).collect::<String>(), "TikTok alert");
            self.driver.dismiss_alert().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Phase 1: watch the feed passively. Zero interactions.
    pub async fn passive_consumption(
        &self,
        clock: &mut SessionClock,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let mut report = WarmingReport::for_phase(WarmingPhase::Passive);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                if !clock.rest(limits::watch_time(&mut rng)).await {
                    break;
                }
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0
                    && self.probe_alert().await?
                {
                    report.alerts_dismissed += 1;
                }

                self.auto().swipe_up(limits::swipe_duration(&mut rng)).await?;
                if !clock.rest(limits::settle_delay(&mut rng)).await {
                    break;
                }

                if rng.gen_bool(pacing.zone_out_probability)
                    && !clock.rest(limits::zone_out(&mut rng)).await
                {
                    break;
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            videos = report.videos_watched,
            minutes = report.duration_secs / 60,
            "TikTok passive run finished"
        );
        Ok(report)
    }

    /// Phases 2-4: consumption mixed with rate-limited likes and follows.
    pub async fn light_engagement(
        &self,
        clock: &mut SessionClock,
        phase: WarmingPhase,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let caps = EngagementLimits::sample(Platform::Tiktok, phase, &mut rng);
        let mut report = WarmingReport::for_phase(phase);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                if !clock.rest(limits::watch_time(&mut rng)).await {
                    break;
                }
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0
                    && self.probe_alert().await?
                {
                    report.alerts_dismissed += 1;
                }

                // Like: double-tap center, then a long cool-off
                if report.likes < caps.max_likes && rng.gen_bool(caps.like_probability) {
                    self.auto().like_current().await?;
                    report.likes += 1;
                    debug!(video = report.videos_watched, "Liked video");
                    if !clock.rest(caps.like_gap(&mut rng)).await {
                        break;
                    }
                }

                // Follow: tap the labelled control on the current creator
                if report.follows < caps.max_follows && rng.gen_bool(caps.follow_probability) {
                    if self.auto().tap_element(Strategy::AccessibilityId, "Follow").await? {
                        report.follows += 1;
                        debug!("Followed creator");
                        if !clock.rest(caps.follow_gap(&mut rng)).await {
                            break;
                        }
                    }
                }

                self.auto().swipe_up(limits::swipe_duration(&mut rng)).await?;
                if !clock.rest(limits::settle_delay(&mut rng)).await {
                    break;
                }

                if rng.gen_bool(pacing.zone_out_probability)
                    && !clock.rest(limits::zone_out(&mut rng)).await
                {
                    break;
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            videos = report.videos_watched,
            likes = report.likes,
            follows = report.follows,
            "TikTok engagement run finished"
        );
        Ok(report)
    }

    /// Search niche hashtags to train recommendations. Returns the number of
    /// tags browsed; consumes a small slice of the session budget.
    pub async fn search_niche_hashtags(
        &self,
        clock: &mut SessionClock,
        hashtags: &[String],
    ) -> Result<u32, AgentError> {
        let mut rng = StdRng::from_entropy();
        if !self.open(clock, &mut rng).await? {
            return Ok(0);
        }

        let auto = self.auto();
        if !auto.tap_element(Strategy::AccessibilityId, "Search").await?
            && !auto.tap_element(Strategy::AccessibilityId, "Discover").await?
        {
            debug!("Search control not found, skipping hashtag training");
            return Ok(0);
        }
        if !clock.rest(Duration::from_secs_f64(rng.gen_range(2.0..=4.0))).await {
            return Ok(0);
        }

        let take = rng.gen_range(2..=4usize).min(hashtags.len());
        let mut searched = 0;
        for tag in hashtags.iter().take(take) {
            let field = self
                .driver
                .find_element(Strategy::ClassChain, "**/XCUIElementTypeSearchField")
                .await?;
            let Some(field_id) = field else { continue };

            self.driver.click_element(&field_id).await?;
            if !clock.rest(Duration::from_millis(500)).await {
                break;
            }
            self.driver.set_element_value(&field_id, &format!("#{tag}")).await?;
            if !clock.rest(Duration::from_secs_f64(rng.gen_range(1.5..=3.0))).await {
                break;
            }

            // Browse a short slice of results
            let browse = Duration::from_secs_f64(rng.gen_range(30.0..=90.0));
            let browse_end = tokio::time::Instant::now() + browse;
            while tokio::time::Instant::now() < browse_end {
                if !clock.rest(Duration::from_secs_f64(rng.gen_range(5.0..=12.0))).await {
                    return Ok(searched);
                }
                auto.swipe_up(rng.gen_range(0.4..=0.7)).await?;
            }

            searched += 1;
            if !clock.rest(Duration::from_secs_f64(rng.gen_range(2.0..=5.0))).await {
                break;
            }
        }

        info!(searched, "Hashtag training finished");
        Ok(searched)
    }
}
