//! Retry policy with exponential backoff for remote calls.
//!
//! The policy is pure: it classifies failures and computes delays. The loop
//! that sleeps and re-invokes lives in [`crate::call`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, ErrorKind, TransportError};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per additional attempt.
    pub backoff_factor: f64,
    /// Spread each sleep by up to ±25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Set the total number of attempts, including the first call.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay after the first failed attempt.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the upper bound for any single backoff delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier applied to the delay after each failure.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Spread each sleep by up to 25% either way.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the invariants the policy relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::new("max_attempts", "must be at least 1"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::new(
                "max_delay",
                format!(
                    "{:?} is shorter than initial_delay {:?}",
                    self.max_delay, self.initial_delay
                ),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::new(
                "backoff_factor",
                format!("{} must be a finite value >= 1.0", self.backoff_factor),
            ));
        }
        Ok(())
    }
}

/// Whether failures of this kind are worth another attempt.
///
/// Timeouts, connection failures and 5xx responses are transient; client
/// errors and unclassified failures are terminal.
pub fn is_retryable(kind: ErrorKind) -> bool {
    match kind {
        ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::ServerError => true,
        ErrorKind::ClientError | ErrorKind::Other => false,
    }
}

/// Backoff schedule and retry classification for one dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn should_retry(&self, error: &TransportError) -> bool {
        is_retryable(error.kind())
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    ///
    /// `min(initial_delay * backoff_factor^(attempt-1), max_delay)`, and zero
    /// for attempt 0. Deterministic: jitter is applied separately by
    /// [`RetryPolicy::sleep_for_attempt`].
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.config.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let initial = self.config.initial_delay.as_nanos() as f64;
        let cap = self.config.max_delay.as_nanos() as f64;
        let nanos = (initial * self.config.backoff_factor.powi(exponent))
            .min(cap)
            .min(u64::MAX as f64);

        Duration::from_nanos(nanos.round() as u64)
    }

    /// Time to actually sleep after the `attempt`-th failure.
    pub fn sleep_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.config.jitter {
            return delay;
        }

        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        let spread = nanos / 4;
        if spread == 0 {
            return delay;
        }
        let jittered = nanos - spread + fastrand::u64(0..=spread.saturating_mul(2));
        Duration::from_nanos(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
