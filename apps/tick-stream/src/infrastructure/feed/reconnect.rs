//! Reconnection Policy
//!
//! Exponential backoff for feed reconnection. The policy is pure with
//! respect to the transport: it only counts consecutive failures and turns
//! an attempt number into a delay.
//!
//! Attempt `n` waits `min(initial_delay * multiplier^(n-1), max_delay)`.
//! Attempts are numbered from 1; `should_retry(n)` is false once `n`
//! exceeds `max_attempts`.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
    /// Maximum reconnection attempts before giving up. Zero closes on the
    /// first failure.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }

    /// Create configuration from [`StreamSettings`](crate::StreamSettings).
    #[must_use]
    pub const fn from_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_base_delay,
            max_delay: settings.reconnect_max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy implementing exponential backoff.
///
/// # Example
///
/// ```rust
/// use tick_stream::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// let attempt = policy.record_failure();
/// assert_eq!(attempt, 1);
/// assert!(policy.should_retry(attempt));
/// assert_eq!(policy.next_delay(attempt), Duration::from_secs(2));
///
/// // Connected again
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Backoff delay for the given attempt, without jitter.
    ///
    /// Attempt 0 is treated as attempt 1.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let initial_millis = self.config.initial_delay.as_millis() as f64;
        let scaled = (initial_millis * self.config.multiplier.powi(exponent)).round();

        let max_millis = self.config.max_delay.as_millis();
        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else if scaled.is_infinite() {
            max_millis
        } else {
            0
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Backoff delay for the given attempt with the configured jitter applied.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.next_delay(attempt))
    }

    /// Whether the given attempt is still within budget.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.config.max_attempts
    }

    /// Record a failed connection and return the attempt number to use next.
    pub const fn record_failure(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Consecutive failures since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Convenience: record a failure and return its delay, or an error once
    /// the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ReconnectError::MaxAttemptsExceeded`] when the next attempt
    /// would exceed `max_attempts`.
    pub fn next_attempt(&mut self) -> Result<(u32, Duration), ReconnectError> {
        let attempt = self.record_failure();
        if !self.should_retry(attempt) {
            return Err(ReconnectError::MaxAttemptsExceeded(self.config.max_attempts));
        }
        Ok((attempt, self.delay_with_jitter(attempt)))
    }

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

/// Error type for reconnection failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}
