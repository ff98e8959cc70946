//! Reconnection Policy
//!
//! Implements capped exponential backoff for transport reconnection.
//! Attempt `k` (1-indexed) waits `min(base_delay * 2^(k-1), max_delay)`,
//! optionally randomized by a jitter fraction.
//!
//! Two counters are kept. The attempt index numbers every reconnect since
//! the last successful connection and drives the delay. The failure count
//! covers connect failures only and drives the give-up budget, so a dropped
//! session advances the backoff without spending the budget.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    ///
    /// Zero keeps delays deterministic and non-decreasing.
    pub jitter_factor: f64,
    /// Consecutive connect failures before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor,
            max_attempts,
        }
    }
}

/// Tracks reconnect attempts and consecutive connect failures, and yields
/// backoff delays.
///
/// # Example
///
/// ```rust
/// use price_stream::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let config = ReconnectConfig {
///     base_delay: Duration::from_millis(100),
///     max_attempts: 3,
///     ..ReconnectConfig::default()
/// };
/// let mut policy = ReconnectPolicy::new(config);
///
/// assert_eq!(policy.record_failure(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.record_failure(), Some(Duration::from_millis(200)));
/// // Third consecutive failure exhausts the budget
/// assert_eq!(policy.record_failure(), None);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.failures(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
    failures: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            failures: 0,
        }
    }

    /// Record a failed connect attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the
    /// configured number of consecutive failures has been reached.
    #[must_use]
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if self.is_exhausted() {
            return None;
        }

        Some(self.next_delay())
    }

    /// Record that a live session dropped.
    ///
    /// Returns the delay before the first reconnect. Later failures continue
    /// the backoff from there. The failure budget is untouched.
    #[must_use]
    pub fn record_session_lost(&mut self) -> Duration {
        self.next_delay()
    }

    fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay_for_attempt(self.attempt)
    }

    /// Backoff delay for attempt `k` (1-indexed), with jitter applied.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.base_delay_for_attempt(attempt))
    }

    /// Backoff delay for attempt `k` (1-indexed), without jitter.
    #[must_use]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        let base_millis = u64::try_from(self.config.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.config.max_delay.as_millis()).unwrap_or(u64::MAX);

        Duration::from_millis(base_millis.saturating_mul(factor).min(max_millis))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
        self.failures = 0;
    }

    /// Reconnect attempts since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Check if the failure budget is used up.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.failures >= self.config.max_attempts
    }

    /// Get the policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
