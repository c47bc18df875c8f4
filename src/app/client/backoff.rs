//! Throttle backoff policy
//!
//! One reusable object holds the backoff law: every consecutive throttling
//! response (or transient failure) doubles a multiplier applied to the base
//! pacing delay, up to a ceiling. Any usable response resets it.

use std::time::Duration;

/// Exponential backoff state for throttling responses
#[derive(Debug, Clone)]
pub struct ThrottleBackoff {
    base_delay: Duration,
    ceiling: u32,
    multiplier: u32,
    consecutive_throttles: u32,
}

impl ThrottleBackoff {
    /// Backoff over `base_delay` with the multiplier capped at `ceiling`
    pub fn new(base_delay: Duration, ceiling: u32) -> Self {
        Self {
            base_delay,
            ceiling: ceiling.max(1),
            multiplier: 1,
            consecutive_throttles: 0,
        }
    }

    /// Register a throttle and return how long to wait before retrying
    ///
    /// Delays are non-decreasing across consecutive calls and never exceed
    /// `base_delay × ceiling`.
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_throttles += 1;
        self.multiplier = self.multiplier.saturating_mul(2).min(self.ceiling);
        self.current_delay()
    }

    /// Return to baseline after a non-throttled response
    pub fn reset(&mut self) {
        self.multiplier = 1;
        self.consecutive_throttles = 0;
    }

    /// Delay implied by the current multiplier
    pub fn current_delay(&self) -> Duration {
        self.base_delay.saturating_mul(self.multiplier)
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn consecutive_throttles(&self) -> u32 {
        self.consecutive_throttles
    }

    /// Largest delay this policy can produce
    pub fn max_delay(&self) -> Duration {
        self.base_delay.saturating_mul(self.ceiling)
    }
}
