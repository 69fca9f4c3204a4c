//! Circuit breaker for a single remote dependency.
//!
//! The breaker stops calling a dependency that keeps failing, waits out a
//! cool-down, then lets a bounded number of trial calls through before it
//! trusts the dependency again.
//!
//! ```text
//!            failure_threshold consecutive failures
//!   CLOSED ─────────────────────────────────────────▶ OPEN
//!     ▲                                                │
//!     │ half_open_max_attempts                         │ reset_timeout
//!     │ successful trials                              │ (lazy check or timer)
//!     │                                                ▼
//!     └──────────────────────────────────────────── HALF-OPEN
//!                      any trial failure ──▶ OPEN
//! ```
//!
//! All decisions and state mutations happen under one lock that is never
//! held across the wrapped call, so concurrent callers never act on a state
//! another caller already changed. Every transition bumps a generation
//! counter; timers and in-flight outcomes from an older generation no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, TimerHandle, TokioClock};
use crate::error::{BreakerError, ConfigError};
use crate::events::{EventBus, DEFAULT_CAPACITY};
use crate::lock;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cool-down before trial calls are allowed, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub reset_timeout: Duration,
    /// Trial calls allowed while half-open; all must succeed to close.
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set how many consecutive failures open the circuit.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before trial calls are allowed.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set how many trial calls run, and must succeed, while half-open.
    pub fn with_half_open_max_attempts(mut self, attempts: u32) -> Self {
        self.half_open_max_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new("failure_threshold", "must be at least 1"));
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::new("reset_timeout", "must be greater than zero"));
        }
        if self.half_open_max_attempts == 0 {
            return Err(ConfigError::new(
                "half_open_max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// States of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, failures are counted.
    Closed,
    /// Failing fast, calls are rejected.
    Open,
    /// Cool-down elapsed, a bounded number of trial calls run.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Lifecycle events published on [`CircuitBreaker::events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CircuitEvent {
    TransitionToOpen {
        breaker: String,
        consecutive_failures: u32,
    },
    TransitionToHalfOpen {
        breaker: String,
    },
    TransitionToClosed {
        breaker: String,
    },
    OperationRejected {
        breaker: String,
        state: CircuitState,
    },
}

/// Point-in-time view of a breaker, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_attempts_used: u32,
    pub half_open_successes: u32,
    pub last_failure_at: Option<Instant>,
}

/// Circuit breaker for one dependency. Owned by the data source that built it.
#[derive(Debug)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    events: EventBus<CircuitEvent>,
    core: Mutex<Core>,
}

#[derive(Debug)]
struct Core {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_attempts_used: u32,
    /// Trials that completed successfully in the current half-open window.
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
    generation: u64,
    timer: Option<TimerHandle>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(TokioClock::new()))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                clock,
                events: EventBus::new(DEFAULT_CAPACITY),
                core: Mutex::new(Core {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    half_open_attempts_used: 0,
                    half_open_successes: 0,
                    last_failure_at: None,
                    generation: 0,
                    timer: None,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &EventBus<CircuitEvent> {
        &self.shared.events
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.shared.core).state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let core = lock(&self.shared.core);
        CircuitSnapshot {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            half_open_attempts_used: core.half_open_attempts_used,
            half_open_successes: core.half_open_successes,
            last_failure_at: core.last_failure_at,
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// The operation's own error comes back as [`BreakerError::Inner`]; the
    /// other variants mean it was never invoked.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.shared.admit()?;
        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                permit.fail();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Force the circuit closed, zero every counter and cancel the pending
    /// half-open timer.
    pub fn reset(&self) {
        let shared = &self.shared;
        let mut core = lock(&shared.core);
        let previous = core.state;
        core.last_failure_at = None;
        shared.close(&mut core);
        if previous != CircuitState::Closed {
            info!(breaker = %shared.name, from = %previous, "circuit_reset");
        }
    }
}

impl Shared {
    fn admit<E>(self: &Arc<Self>) -> Result<Permit<'_>, BreakerError<E>> {
        let mut core = lock(&self.core);

        if core.state == CircuitState::Open {
            let elapsed = core.last_failure_at.map_or(Duration::MAX, |at| {
                self.clock.now().saturating_duration_since(at)
            });
            if elapsed < self.config.reset_timeout {
                self.reject(&core);
                return Err(BreakerError::CircuitOpen {
                    breaker: self.name.clone(),
                    retry_after: self.config.reset_timeout - elapsed,
                });
            }
            self.enter_half_open(&mut core);
        }

        if core.state == CircuitState::Closed {
            return Ok(Permit::new(self, core.generation, false));
        }

        if core.half_open_attempts_used >= self.config.half_open_max_attempts {
            self.reject(&core);
            return Err(BreakerError::MaxHalfOpenAttempts {
                breaker: self.name.clone(),
                max_attempts: self.config.half_open_max_attempts,
            });
        }
        core.half_open_attempts_used += 1;
        debug!(
            breaker = %self.name,
            trial = core.half_open_attempts_used,
            of = self.config.half_open_max_attempts,
            "circuit_trial_admitted"
        );
        Ok(Permit::new(self, core.generation, true))
    }

    fn record_success(self: &Arc<Self>, generation: u64) {
        let mut core = lock(&self.core);
        if core.generation != generation {
            return;
        }
        match core.state {
            CircuitState::Closed => core.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                core.half_open_successes += 1;
                if core.half_open_successes >= self.config.half_open_max_attempts {
                    self.close(&mut core);
                } else {
                    debug!(
                        breaker = %self.name,
                        successes = core.half_open_successes,
                        of = self.config.half_open_max_attempts,
                        "circuit_trial_succeeded"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(self: &Arc<Self>, generation: u64) {
        let mut core = lock(&self.core);
        if core.generation != generation {
            return;
        }
        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                core.last_failure_at = Some(self.clock.now());
                if core.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut core);
                } else {
                    debug!(
                        breaker = %self.name,
                        consecutive_failures = core.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "circuit_failure_counted"
                    );
                }
            }
            CircuitState::HalfOpen => {
                core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                self.trip(&mut core);
            }
            CircuitState::Open => {}
        }
    }

    /// A trial that never reported an outcome hands its slot back.
    fn release_trial(&self, generation: u64) {
        let mut core = lock(&self.core);
        if core.generation == generation && core.state == CircuitState::HalfOpen {
            core.half_open_attempts_used = core.half_open_attempts_used.saturating_sub(1);
        }
    }

    fn on_reset_timer(&self, generation: u64) {
        let mut core = lock(&self.core);
        if core.generation == generation && core.state == CircuitState::Open {
            self.enter_half_open(&mut core);
        }
    }

    fn trip(self: &Arc<Self>, core: &mut Core) {
        core.state = CircuitState::Open;
        core.last_failure_at = Some(self.clock.now());
        core.half_open_attempts_used = 0;
        core.half_open_successes = 0;
        core.generation += 1;

        let generation = core.generation;
        let weak = Arc::downgrade(self);
        // Replacing the handle cancels the previous timer.
        core.timer = Some(self.clock.schedule_after(
            self.config.reset_timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_reset_timer(generation);
                }
            }),
        ));

        warn!(
            breaker = %self.name,
            consecutive_failures = core.consecutive_failures,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "circuit_opened"
        );
        self.events.publish(CircuitEvent::TransitionToOpen {
            breaker: self.name.clone(),
            consecutive_failures: core.consecutive_failures,
        });
    }

    fn enter_half_open(&self, core: &mut Core) {
        core.state = CircuitState::HalfOpen;
        core.half_open_attempts_used = 0;
        core.half_open_successes = 0;
        core.generation += 1;
        core.timer = None;

        info!(breaker = %self.name, "circuit_half_open");
        self.events.publish(CircuitEvent::TransitionToHalfOpen {
            breaker: self.name.clone(),
        });
    }

    fn close(&self, core: &mut Core) {
        let was_closed = core.state == CircuitState::Closed;
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.half_open_attempts_used = 0;
        core.half_open_successes = 0;
        core.generation += 1;
        core.timer = None;

        if !was_closed {
            info!(breaker = %self.name, "circuit_closed");
            self.events.publish(CircuitEvent::TransitionToClosed {
                breaker: self.name.clone(),
            });
        }
    }

    fn reject(&self, core: &Core) {
        debug!(breaker = %self.name, state = %core.state, "circuit_rejected_call");
        self.events.publish(CircuitEvent::OperationRejected {
            breaker: self.name.clone(),
            state: core.state,
        });
    }
}

/// Admission ticket for one call. Must be settled with an outcome; a permit
/// dropped unsettled (the call was cancelled) releases its half-open slot.
struct Permit<'a> {
    shared: &'a Arc<Shared>,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(shared: &'a Arc<Shared>, generation: u64, trial: bool) -> Self {
        Self {
            shared,
            generation,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.shared.record_success(self.generation);
    }

    fn fail(mut self) {
        self.settled = true;
        self.shared.record_failure(self.generation);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.shared.release_trial(self.generation);
        }
    }
}
