//! Reddit warmer. Defined for future use; the scheduler does not yet route
//! warming sessions here.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agent::AgentError;
use crate::agent::{Automation, Strategy, UiDriver};
use crate::storage::Platform;

use super::limits::{EngagementLimits, Pacing};
use super::{SessionClock, WarmingPhase, WarmingReport};

pub const BUNDLE: &str = "com.reddit.Reddit";

pub struct RedditWarmer<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> RedditWarmer<'a> {
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
            info!(alert = %text.chars().take(80).collect::<String>(), "Reddit alert");
            self.driver.dismiss_alert().await?;
        }
        Ok(true)
    }

    /// Browse the home feed, read posts, occasionally open comments.
    pub async fn passive_consumption(
        &self,
        clock: &mut SessionClock,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let mut report = WarmingReport::for_phase(WarmingPhase::Passive);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                // Text posts read faster than video feeds
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(3.0..=15.0)))
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

                // Occasionally open a post and scroll the comments
                if rng.gen_bool(0.15) {
                    let size = self.driver.screen_size();
                    self.driver
                        .tap(size.width / 2, size.height * 2 / 5)
                        .await?;
                    if !clock
                        .rest(Duration::from_secs_f64(rng.gen_range(3.0..=12.0)))
                        .await
                    {
                        break;
                    }
                    for _ in 0..rng.gen_range(1..=4u32) {
                        self.auto().swipe_up(rng.gen_range(0.4..=0.7)).await?;
                        if !clock
                            .rest(Duration::from_secs_f64(rng.gen_range(2.0..=5.0)))
                            .await
                        {
                            break;
                        }
                    }
                    // Swipe-back to the feed
                    self.driver
                        .swipe((0, size.height / 2), (size.width, size.height / 2), 0.3)
                        .await?;
                }
            }
        }

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(posts = report.videos_watched, "Reddit passive run finished");
        Ok(report)
    }

    /// Light engagement: upvotes on the feed.
    pub async fn light_engagement(
        &self,
        clock: &mut SessionClock,
        phase: WarmingPhase,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let caps = EngagementLimits::sample(Platform::Reddit, phase, &mut rng);
        let pacing = Pacing::sample(&mut rng);
        let mut report = WarmingReport::for_phase(phase);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            loop {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(3.0..=12.0)))
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
                    let upvote = self
                        .driver
                        .find_element(
                            Strategy::PredicateString,
                            r#"name CONTAINS "upvote" OR name CONTAINS "Upvote""#,
                        )
                        .await?;
                    if let Some(id) = upvote {
                        self.driver.click_element(&id).await?;
                        report.likes += 1;
                        debug!(post = report.videos_watched, "Upvoted post");
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
            posts = report.videos_watched,
            upvotes = report.likes,
            "Reddit engagement run finished"
        );
        Ok(report)
    }
}
