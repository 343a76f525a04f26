//! YouTube warmer: Home feed plus Shorts. Defined for future use; the
//! scheduler does not yet route warming sessions here.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agent::AgentError;
use crate::agent::{Automation, Strategy, UiDriver};
use crate::storage::Platform;

use super::limits::{self, EngagementLimits, Pacing};
use super::{SessionClock, WarmingPhase, WarmingReport};

pub const BUNDLE: &str = "com.google.ios.youtube";

/// Share of the session spent on the Home feed before Shorts.
const HOME_SHARE: f64 = 0.4;

pub struct YouTubeWarmer<'a> {
    driver: &'a dyn UiDriver,
}

impl<'a> YouTubeWarmer<'a> {
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
        if let Some(text) = self.driver.alert_text().await? {
            info!(alert = %text.chars().take(80).collect::<String>(), "YouTube alert");
            self.driver.dismiss_alert().await?;
        }
        Ok(true)
    }

    async fn goto_shorts(&self, clock: &mut SessionClock, rng: &mut StdRng) -> Result<(), AgentError> {
        if let Some(id) = self
            .driver
            .find_element(Strategy::AccessibilityId, "Shorts")
            .await?
        {
            self.driver.click_element(&id).await?;
        }
        clock
            .rest(Duration::from_secs_f64(rng.gen_range(2.0..=4.0)))
            .await;
        Ok(())
    }

    /// Browse Home, then watch Shorts passively.
    pub async fn passive_consumption(
        &self,
        clock: &mut SessionClock,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let mut report = WarmingReport::for_phase(WarmingPhase::Passive);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            let home_end = tokio::time::Instant::now() + clock.remaining().mul_f64(HOME_SHARE);

            while tokio::time::Instant::now() < home_end {
                if !clock
                    .rest(Duration::from_secs_f64(rng.gen_range(5.0..=20.0)))
                    .await
                {
                    break;
                }
                self.auto().swipe_up(rng.gen_range(0.5..=0.9)).await?;
                report.videos_watched += 1;

                if report.videos_watched % pacing.alert_check_every == 0 {
                    if let Some(_text) = self.driver.alert_text().await? {
                        self.driver.dismiss_alert().await?;
                        report.alerts_dismissed += 1;
                    }
                }
            }

            if !clock.stopped() && !clock.expired() {
                self.goto_shorts(clock, &mut rng).await?;

                loop {
                    if !clock.rest(limits::watch_time(&mut rng)).await {
                        break;
                    }
                    report.videos_watched += 1;

                    if report.videos_watched % pacing.alert_check_every == 0 {
                        if let Some(_text) = self.driver.alert_text().await? {
                            self.driver.dismiss_alert().await?;
                            report.alerts_dismissed += 1;
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
        info!(videos = report.videos_watched, "YouTube passive run finished");
        Ok(report)
    }

    /// Light engagement: likes on Shorts via the labelled control.
    pub async fn light_engagement(
        &self,
        clock: &mut SessionClock,
        phase: WarmingPhase,
    ) -> Result<WarmingReport, AgentError> {
        let mut rng = StdRng::from_entropy();
        let pacing = Pacing::sample(&mut rng);
        let caps = EngagementLimits::sample(Platform::Youtube, phase, &mut rng);
        let mut report = WarmingReport::for_phase(phase);
        let started = tokio::time::Instant::now();

        if self.open(clock, &mut rng).await? {
            self.goto_shorts(clock, &mut rng).await?;

            loop {
                if !clock.rest(limits::watch_time(&mut rng)).await {
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
                    if let Some(id) = self
                        .driver
                        .find_element(Strategy::AccessibilityId, "Like")
                        .await?
                    {
                        self.driver.click_element(&id).await?;
                        report.likes += 1;
                        debug!(short = report.videos_watched, "Liked Short");
                        if !clock.rest(caps.like_gap(&mut rng)).await {
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

        report.duration_secs = started.elapsed().as_secs();
        report.interrupted = clock.stopped();
        info!(
            shorts = report.videos_watched,
            likes = report.likes,
            "YouTube engagement run finished"
        );
        Ok(report)
    }
}
