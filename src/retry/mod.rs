//! Retry backoff policy.
//!
//! Pure delay computation for the request executor's retry loop: exponential
//! backoff with multiplicative jitter, capped at a maximum delay. The policy
//! carries no clock or sleep of its own; the executor owns scheduling.

use std::time::Duration;

use rand::Rng;

/// Default initial delay.
const BASE_DELAY: Duration = Duration::from_millis(100);
/// Default delay cap.
const MAX_DELAY: Duration = Duration::from_secs(5);
/// Default multiplicative jitter factor.
const JITTER_FACTOR: f64 = 0.5;

/// Backoff policy configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Initial delay, doubled on each retry.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Jitter half-width as a fraction of the exponential delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            jitter_factor: JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial delay.
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter factor, clamped to [0, 1].
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before the given retry, using thread-local randomness for jitter.
    ///
    /// Negative retry counts are coerced to 0.
    pub fn delay(&self, retry: i32) -> Duration {
        self.delay_with(retry, &mut rand::thread_rng())
    }

    /// Deterministic form of [`delay`](Self::delay) for a caller-supplied RNG.
    pub fn delay_with<R: Rng>(&self, retry: i32, rng: &mut R) -> Duration {
        let retry = retry.max(0) as u32;

        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(retry as i32);
        // Jitter multiplier in [1 - j, 1 + j]; spreads simultaneous retries.
        let jitter = if self.jitter_factor > 0.0 {
            rng.gen_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };
        let with_jitter = exponential * (1.0 + jitter);

        let capped = with_jitter.clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}
