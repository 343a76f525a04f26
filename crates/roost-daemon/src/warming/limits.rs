//! Pacing and engagement ceilings for warming sessions.
//!
//! All values are sampled from closed intervals with an independently seeded
//! RNG per warming call, so no two sessions share a timing fingerprint.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

use crate::storage::Platform;

use super::WarmingPhase;

/// Per-session sampled pacing knobs.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Chance per video of a "zone-out" break, sampled in 5-15%.
    pub zone_out_probability: f64,
    /// Alert probe cadence: every 5-8 consumed videos.
    pub alert_check_every: u32,
}

impl Pacing {
    pub fn sample(rng: &mut impl Rng) -> Self {
        Self {
            zone_out_probability: rng.gen_range(0.05..=0.15),
            alert_check_every: rng.gen_range(5..=8),
        }
    }
}

/// Video watch time: uniform(5, 25) s, with a 30% chance of watching to
/// completion at uniform(20, 60) s.
pub fn watch_time(rng: &mut impl Rng) -> Duration {
    let secs = if rng.gen_bool(0.30) {
        rng.gen_range(20.0..=60.0)
    } else {
        rng.gen_range(5.0..=25.0)
    };
    Duration::from_secs_f64(secs)
}

/// Swipe gesture duration between videos: uniform(0.3, 0.8) s.
pub fn swipe_duration(rng: &mut impl Rng) -> f64 {
    rng.gen_range(0.3..=0.8)
}

/// Post-swipe settle delay: uniform(0.5, 1.5) s.
pub fn settle_delay(rng: &mut impl Rng) -> Duration {
    Duration::from_secs_f64(rng.gen_range(0.5..=1.5))
}

/// Zone-out break duration: uniform(5, 30) s.
pub fn zone_out(rng: &mut impl Rng) -> Duration {
    Duration::from_secs_f64(rng.gen_range(5.0..=30.0))
}

/// Per-session engagement ceilings and probabilities.
#[derive(Debug, Clone, Copy)]
pub struct EngagementLimits {
    pub max_likes: u32,
    pub max_follows: u32,
    /// Like probability per video, sampled in 12-15%.
    pub like_probability: f64,
    pub follow_probability: f64,
    like_gap_secs: RangeBounds,
    follow_gap_secs: RangeBounds,
}

#[derive(Debug, Clone, Copy)]
struct RangeBounds {
    min: u64,
    max: u64,
}

impl EngagementLimits {
    /// Sample session ceilings for a platform and phase.
    ///
    /// Phase 4 relaxes the caps without removing them; Instagram follows run
    /// tighter than TikTok.
    pub fn sample(platform: Platform, phase: WarmingPhase, rng: &mut impl Rng) -> Self {
        let relaxed = phase == WarmingPhase::Active;

        let likes: RangeInclusive<u32> = if relaxed { 8..=15 } else { 5..=10 };
        let follows: RangeInclusive<u32> = match (platform, relaxed) {
            (Platform::Instagram, false) => 3..=5,
            (Platform::Instagram, true) => 4..=7,
            (_, false) => 3..=7,
            (_, true) => 5..=10,
        };

        Self {
            max_likes: rng.gen_range(likes),
            max_follows: rng.gen_range(follows),
            like_probability: rng.gen_range(0.12..=0.15),
            follow_probability: 0.06,
            like_gap_secs: RangeBounds { min: 30, max: 90 },
            follow_gap_secs: RangeBounds { min: 30, max: 60 },
        }
    }

    /// Cool-off after a like: uniform(30, 90) s.
    pub fn like_gap(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_secs(rng.gen_range(self.like_gap_secs.min..=self.like_gap_secs.max))
    }

    /// Cool-off after a follow: uniform(30, 60) s.
    pub fn follow_gap(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_secs(rng.gen_range(self.follow_gap_secs.min..=self.follow_gap_secs.max))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn watch_time_within_contract() {
        let mut rng = rng();
        let mut saw_long = false;
        for _ in 0..500 {
            let t = watch_time(&mut rng).as_secs_f64();
            assert!((5.0..=60.0).contains(&t), "watch {t}");
            if t > 25.0 {
                saw_long = true;
            }
        }
        assert!(saw_long, "full-watch branch should appear in 500 samples");
    }

    #[test]
    fn gesture_timings_within_contract() {
        let mut rng = rng();
        for _ in 0..500 {
            let swipe = swipe_duration(&mut rng);
            assert!((0.3..=0.8).contains(&swipe));

            let settle = settle_delay(&mut rng).as_secs_f64();
            assert!((0.5..=1.5).contains(&settle));

            let zone = zone_out(&mut rng).as_secs_f64();
            assert!((5.0..=30.0).contains(&zone));
        }
    }

    #[test]
    fn pacing_samples_within_contract() {
        let mut rng = rng();
        for _ in 0..500 {
            let p = Pacing::sample(&mut rng);
            assert!((0.05..=0.15).contains(&p.zone_out_probability));
            assert!((5..=8).contains(&p.alert_check_every));
        }
    }

    #[test]
    fn tiktok_limits_within_contract() {
        let mut rng = rng();
        for _ in 0..500 {
            let l = EngagementLimits::sample(Platform::Tiktok, WarmingPhase::Light, &mut rng);
            assert!((5..=10).contains(&l.max_likes));
            assert!((3..=7).contains(&l.max_follows));
            assert!((0.12..=0.15).contains(&l.like_probability));
            assert!((l.follow_probability - 0.06).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn instagram_follow_cap_is_tighter() {
        let mut rng = rng();
        for _ in 0..500 {
            let l = EngagementLimits::sample(Platform::Instagram, WarmingPhase::Moderate, &mut rng);
            assert!((3..=5).contains(&l.max_follows));
        }
    }

    #[test]
    fn phase_four_relaxes_without_removing_caps() {
        let mut rng = rng();
        for _ in 0..500 {
            let l = EngagementLimits::sample(Platform::Tiktok, WarmingPhase::Active, &mut rng);
            assert!((8..=15).contains(&l.max_likes));
            assert!((5..=10).contains(&l.max_follows));

            let ig = EngagementLimits::sample(Platform::Instagram, WarmingPhase::Active, &mut rng);
            assert!((4..=7).contains(&ig.max_follows));
        }
    }

    #[test]
    fn action_gaps_within_contract() {
        let mut rng = rng();
        let l = EngagementLimits::sample(Platform::Tiktok, WarmingPhase::Light, &mut rng);
        for _ in 0..500 {
            let like = l.like_gap(&mut rng).as_secs();
            assert!((30..=90).contains(&like));
            let follow = l.follow_gap(&mut rng).as_secs();
            assert!((30..=60).contains(&follow));
        }
    }
}
