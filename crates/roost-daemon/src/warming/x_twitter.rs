//! X/Twitter warmer: timeline browsing. Defined for future use; the
//! scheduler does not yet route warming sessions here.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agent::AgentError;
use crate::agent::{Automation, Strategy, UiDriver};
use crate::storage::Platform;

use super::limits::{EngagementLimits, Pacing};
use super::{SessionClock, WarmingPhase, WarmingReport};

pub const BUNDLE: &str = "com.atebits.Tweetie2";

pub struct XTwitterWarmer<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> XTwitterWarmer<'a> {
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
        if let Some(text) = self.driver.alert_text().await? {
            info!(alert = %text.chars().take(80).collect::<String>(), "X alert");
            self.driver.dismiss_alert().await?;
        }
        Ok(true)
    }

    /// Browse the timeline, read threads, zone out occasionally.
    pub async fn passive_consumption(
        &self,
        clock: &mut SessionClock,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let mut report = WarmingReport::for_phase(WarmingPhase::Passive);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(2.0..=10.0)))
                    .await
                {
                    break;
                }
                report.videos_watched += 1;

                if report.videos_watched % 8 == 0 {
                    if let Some(_text) = self.driver.alert_text().await? {
                        self.driver.dismiss_alert().await?;
                        report.alerts_dismissed += 1;
                    }
                }

                self.auto().swipe_up(rng.gen_range(0.4..=0.8)).await?;
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(0.5..=2.0)))
                    .await
                {
                    break;
                }

                // Occasionally open a tweet and read replies
                if rng.gen_bool(0.10) {
                    let size = self.driver.screen_size();
                    self.driver
                        .tap(size.width / 2, size.height * 7 / 20)
                        .await?;
                    if !clock
                        .rest(Duration::from_secs_f64(rng.gen_range(3.0..=15.0)))
                        .await
                    {
                        break;
                    }
                    for _ in 0..rng.gen_range(1..=3u32) {
                        self.auto().swipe_up(rng.gen_range(0.4..=0.7)).await?;
                        if !clock
                            .rest(Duration::from_secs_f64(rng.gen_range(2.0..=5.0)))
                            .await
                        {
                            break;
                        }
                    }
                    if let Some(id) = self
                        .driver
                        .find_element(Strategy::AccessibilityId, "Back")
                        .await?
                    {
                        self.driver.click_element(&id).await?;
                    }
                }

                if rng.gen_bool(0.05)
                    && !clock
                        .rest(Duration::from_secs_f64(rng.gen_range(8.0..=20.0)))
                        .await
                {
                    break;
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(tweets = report.videos_watched, "X passive run finished");
        Ok(report)
    }

    /// Light engagement: likes on the timeline.
    pub async fn light_engagement(
        &self,
        clock: &mut SessionClock,
        phase: WarmingPhase,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let caps = EngagementLimits::sample(Platform::XTwitter, phase, &mut rng);
        let pacing = Pacing::sample(&mut rng);
        let mut report = WarmingReport::for_phase(phase);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(3.0..=10.0)))
                    .await
                {
                    break;
                }
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0 {
                    if let Some(_text) = self.driver.alert_text().await? {
                        self.driver.dismiss_alert().await?;
                        report.alerts_dismissed += 1;
                    }
                }

                if report.likes < caps.max_likes && rng.gen_bool(caps.like_probability) {
                    let like = self
                        .driver
                        .find_element(
                            Strategy::PredicateString,
                            r#"name CONTAINS "Like" AND type == "XCUIElementTypeButton""#,
                        )
                        .await?;
                    if let Some(id) = like {
                        self.driver.click_element(&id).await?;
                        report.likes += 1;
                        debug!(tweet = report.videos_watched, "Liked tweet");
                        if !clock.rest(caps.like_gap(&mut rng)).await {
                            break;
                        }
                    }
                }

                self.auto().swipe_up(rng.gen_range(0.4..=0.8)).await?;
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(0.5..=2.0)))
                    .await
                {
                    break;
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            tweets = report.videos_watched,
            likes = report.likes,
            "X engagement run finished"
        );
        Ok(report)
    }
}
