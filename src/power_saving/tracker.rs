use std::time::{Duration, Instant};

use super::is_duplicate;
use crate::models::Color;

/// Tracks how long the LED colors have been static
#[derive(Debug)]
pub struct StaticTracker {
    threshold: Option<Duration>,
    baseline: Option<Vec<Color>>,
    last_change: Instant,
    is_static: bool,
}

impl StaticTracker {
    /// Create a tracker; `None` disables static detection
    pub fn new(threshold: Option<Duration>, now: Instant) -> Self {
        Self {
            threshold,
            baseline: None,
            last_change: now,
            is_static: false,
        }
    }

    /// Compare `leds` with the baseline, and update the static flag
    pub fn check(&mut self, leds: &[Color], now: Instant) -> bool {
        let changed = self
            .baseline
            .as_deref()
            .map(|baseline| !is_duplicate(baseline, leds))
            .unwrap_or(true);

        if changed {
            self.last_change = now;
            self.baseline = Some(leds.to_vec());
        }

        self.is_static = self
            .threshold
            .map(|threshold| now.saturating_duration_since(self.last_change) > threshold)
            .unwrap_or(false);

        if self.is_static {
            trace!(since = ?now.saturating_duration_since(self.last_change), "static image");
        }

        self.is_static
    }

    /// Result of the last [`StaticTracker::check`]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Replace the baseline without counting it as a content change
    pub fn reseed(&mut self, leds: &[Color]) {
        self.baseline = Some(leds.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(60);

    fn leds(value: u8) -> Vec<Color> {
        vec![Color::new(value, value, value); 10]
    }

    #[test]
    fn static_after_threshold() {
        let start = Instant::now();
        let mut tracker = StaticTracker::new(Some(THRESHOLD), start);

        assert!(!tracker.check(&leds(1), start));
        assert!(!tracker.check(&leds(1), start + THRESHOLD));
        assert!(tracker.check(&leds(1), start + THRESHOLD + Duration::from_secs(1)));
        assert!(tracker.is_static());
    }

    #[test]
    fn change_restarts_the_timer() {
        let start = Instant::now();
        let mut tracker = StaticTracker::new(Some(THRESHOLD), start);

        tracker.check(&leds(1), start);
        assert!(tracker.check(&leds(1), start + Duration::from_secs(61)));

        assert!(!tracker.check(&leds(2), start + Duration::from_secs(62)));
        assert!(!tracker.check(&leds(2), start + Duration::from_secs(100)));
    }

    #[test]
    fn disabled_threshold_is_never_static() {
        let start = Instant::now();
        let mut tracker = StaticTracker::new(None, start);

        tracker.check(&leds(1), start);
        assert!(!tracker.check(&leds(1), start + Duration::from_secs(3600)));
    }

    #[test]
    fn reseed_keeps_the_timer() {
        let start = Instant::now();
        let mut tracker = StaticTracker::new(Some(THRESHOLD), start);

        tracker.check(&leds(1), start);
        tracker.reseed(&leds(7));

        // Same content as the reseeded baseline, still static
        assert!(tracker.check(&leds(7), start + Duration::from_secs(61)));
    }
}
