//! Instagram warmer: classic feed plus Reels, with a 40/60 time split.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agent::AgentError;
use crate::agent::{Automation, Strategy, UiDriver};
use crate::storage::Platform;

use super::limits::{self, EngagementLimits, Pacing};
use super::{SessionClock, WarmingPhase, WarmingReport};

pub const BUNDLE: &str = "com.burbn.instagram";

/// Share of the session spent in the classic feed before switching to Reels.
const FEED_SHARE: f64 = 0.4;

pub struct InstagramWarmer<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> InstagramWarmer<'a> {
    pub fn new(driver: &'a dyn UiDriver) -> Self {
        Self { driver }
    }

    fn auto(&self) -> Automation<'_> {
        Automation::new(self.driver)
    }

    async fn open(&self, clock: &mut SessionClock, rng: &mut StdRng) -> Result<bool, AgentError> {
        self.driver.activate_app(BUNDLE).await?;
        if !clock.rest(Duration::from_secs_f64(rng.gen_range(2.0..=4.0))).await {
            return Ok(false);
        }
        self.probe_alert().await?;
        Ok(true)
    }

    async fn probe_alert(&self) -> Result<bool, AgentError> {
        if let Some(text) = self.driver.alert_text().await? {
            info!(alert = %text.chars().take(80).collect::<String>(), "Instagram alert");
            self.driver.dismiss_alert().await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn switch_to_reels(&self, clock: &mut SessionClock, rng: &mut StdRng) -> Result<(), AgentError> {
        if let Some(id) = self
            .driver
            .find_element(Strategy::AccessibilityId, "Reels")
            .await?
        {
            self.driver.click_element(&id).await?;
        }
        clock
            .rest(Duration::from_secs_f64(rng.gen_range(2.0..=4.0)))
            .await;
        Ok(())
    }

    /// Phase 1: browse the feed, then Reels, with zero interactions.
    pub async fn passive_consumption(
        &self,
        clock: &mut SessionClock,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let mut report = WarmingReport::for_phase(WarmingPhase::Passive);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            let feed_budget = clock.remaining().mul_f64(FEED_SHARE);
            let feed_end = tokio::time::Instant::now() + feed_budget;

            // Classic feed: shorter dwell per post
            while tokio::time::Instant::now() < feed_end {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(3.0..=10.0)))
                    .await
                {
                    break;
                }
                self.auto().swipe_up(rng.gen_range(0.5..=0.9)).await?;
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0
                    && self.probe_alert().await?
                {
                    report.alerts_dismissed += 1;
                }
            }

            if !clock.stopped() && !clock.expired() {
                self.switch_to_reels(clock, &mut rng).await?;

                // Reels: video-feed pacing
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
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            posts = report.videos_watched,
            minutes = report.duration_secs / 60,
            "Instagram passive run finished"
        );
        Ok(report)
    }

    /// Phases 2-4: feed then Reels on the same 40/60 split as passive runs,
    /// with rate-limited likes and follows mixed in.
    ///
    /// The follow action uses the text-labelled button, never coordinates.
    pub async fn light_engagement(
        &self,
        clock: &mut SessionClock,
        phase: WarmingPhase,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let caps = EngagementLimits::sample(Platform::Instagram, phase, &mut rng);
        let mut report = WarmingReport::for_phase(phase);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            let feed_budget = clock.remaining().mul_f64(FEED_SHARE);
            let feed_end = tokio::time::Instant::now() + feed_budget;

            // Classic feed first: shorter dwell, likes only
            while tokio::time::Instant::now() < feed_end {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(3.0..=10.0)))
                    .await
                {
                    break;
                }
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0
                    && self.probe_alert().await?
                {
                    report.alerts_dismissed += 1;
                }

                if report.likes < caps.max_likes && rng.gen_bool(caps.like_probability) {
                    self.auto().like_current().await?;
                    report.likes += 1;
                    debug!(post = report.videos_watched, "Liked feed post");
                    if !clock.rest(caps.like_gap(&mut rng)).await {
                        break;
                    }
                }

                self.auto().swipe_up(rng.gen_range(0.5..=0.9)).await?;
            }

            // Then Reels for the rest of the session, where follows happen
            if !clock.stopped() && !clock.expired() {
                self.switch_to_reels(clock, &mut rng).await?;

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

                    if report.likes < caps.max_likes && rng.gen_bool(caps.like_probability) {
                        self.auto().like_current().await?;
                        report.likes += 1;
                        debug!(post = report.videos_watched, "Liked post");
                        if !clock.rest(caps.like_gap(&mut rng)).await {
                            break;
                        }
                    }

                    if report.follows < caps.max_follows && rng.gen_bool(caps.follow_probability) {
                        let follow = self
                            .driver
                            .find_element(
                                Strategy::PredicateString,
                                r#"label == "Follow" AND type == "XCUIElementTypeButton""#,
                            )
                            .await?;
                        if let Some(id) = follow {
                            self.driver.click_element(&id).await?;
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
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            posts = report.videos_watched,
            likes = report.likes,
            follows = report.follows,
            "Instagram engagement run finished"
        );
        Ok(report)
    }
}
