//! Hold-to-confirm interaction contract
//!
//! Not an authentication mechanism: it only measures how long the user kept
//! the control engaged.

use std::time::Duration;

pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldRitual {
    duration: Duration,
}

impl Default for HoldRitual {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_DURATION)
    }
}

impl HoldRitual {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Progress (0..=100) after holding for `elapsed`
    pub fn progress_at(&self, elapsed: Duration) -> u8 {
        let target = self.duration.as_millis();
        if target == 0 {
            return 100;
        }
        let pct = elapsed.as_millis().saturating_mul(100) / target;
        pct.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_proportional_and_clamped() {
        let ritual = HoldRitual::default();
        assert_eq!(ritual.progress_at(Duration::ZERO), 0);
        assert_eq!(ritual.progress_at(Duration::from_millis(1250)), 50);
        assert_eq!(ritual.progress_at(Duration::from_millis(2499)), 99);
        assert_eq!(ritual.progress_at(Duration::from_millis(2500)), 100);
        assert_eq!(ritual.progress_at(Duration::from_secs(60)), 100);
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        assert_eq!(HoldRitual::new(Duration::ZERO).progress_at(Duration::ZERO), 100);
    }
}
