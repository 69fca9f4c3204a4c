//! Resilient remote call: retry with backoff inside a circuit breaker.
//!
//! ```text
//!   run(op) ──▶ CircuitBreaker::execute ──▶ retry loop ──▶ remote call
//!                      │                        │
//!                      │ rejected               ├─ retryable, attempts left: sleep, retry
//!                      ▼                        └─ otherwise: return
//!               OperationFailure
//! ```
//!
//! The whole retry sequence counts as one breaker call, so a burst of
//! retries against a dead dependency opens the circuit once rather than
//! once per attempt.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clock::{Clock, TokioClock};
use crate::error::{CallError, TransportError};
use crate::events::{DomainEvent, EventBus, DEFAULT_CAPACITY};
use crate::retry::{RetryConfig, RetryPolicy};

/// Retry policy plus circuit breaker for one dependency, with an event bus
/// that reports every phase of every call.
#[derive(Debug)]
pub struct ResilientCall {
    name: String,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    events: EventBus<DomainEvent>,
    clock: Arc<dyn Clock>,
}

impl ResilientCall {
    pub fn new(name: impl Into<String>, retry: RetryConfig, breaker: CircuitBreakerConfig) -> Self {
        Self::builder(name)
            .retry(retry)
            .circuit_breaker(breaker)
            .build()
    }

    pub fn builder(name: impl Into<String>) -> ResilientCallBuilder {
        ResilientCallBuilder {
            name: name.into(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            clock: None,
            event_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        &self.events
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` under the retry policy and circuit breaker.
    ///
    /// `operation` names the call in every event published for it. The
    /// successful value is attached to `OperationSuccess` as JSON.
    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, CallError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let result = self
            .breaker
            .execute(|| self.retry_loop(operation, call))
            .await;

        if let Err(rejection) = &result {
            if rejection.is_rejection() {
                debug!(call = %self.name, operation, error = %rejection, "call_rejected");
                self.events.publish(DomainEvent::OperationFailure {
                    operation: operation.to_owned(),
                    message: rejection.to_string(),
                });
            }
        }
        result
    }

    async fn retry_loop<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, TransportError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        self.events.publish(DomainEvent::OperationInProgress {
            operation: operation.to_owned(),
        });

        let mut attempts: u32 = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(call = %self.name, operation, attempts, "retry_succeeded");
                        self.events.publish(DomainEvent::RetrySuccess {
                            operation: operation.to_owned(),
                            total_attempts: attempts,
                        });
                    }
                    self.events.publish(DomainEvent::OperationSuccess {
                        operation: operation.to_owned(),
                        data: serde_json::to_value(&value).unwrap_or(serde_json::Value::Null),
                    });
                    return Ok(value);
                }
                Err(error)
                    if attempts < self.policy.max_attempts() && self.policy.should_retry(&error) =>
                {
                    let delay = self.policy.sleep_for_attempt(attempts);
                    debug!(
                        call = %self.name,
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retry_scheduled"
                    );
                    self.events.publish(DomainEvent::RetryAttempt {
                        operation: operation.to_owned(),
                        attempt_number: attempts,
                        delay,
                        cause: error,
                    });
                    self.clock.sleep(delay).await;
                    attempts += 1;
                }
                Err(error) => {
                    if attempts > 1 {
                        warn!(call = %self.name, operation, attempts, error = %error, "retries_exhausted");
                        self.events.publish(DomainEvent::RetryExhausted {
                            operation: operation.to_owned(),
                            cause: error.clone(),
                            total_attempts: attempts,
                        });
                    } else {
                        debug!(call = %self.name, operation, error = %error, "call_failed");
                    }
                    self.events.publish(DomainEvent::OperationFailure {
                        operation: operation.to_owned(),
                        message: error.to_string(),
                    });
                    return Err(error);
                }
            }
        }
    }
}

/// Builder for [`ResilientCall`].
#[derive(Debug)]
pub struct ResilientCallBuilder {
    name: String,
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
    clock: Option<Arc<dyn Clock>>,
    event_capacity: usize,
}

impl ResilientCallBuilder {
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Time source for backoff sleeps and breaker timers.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> ResilientCall {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(TokioClock::new()) as Arc<dyn Clock>);
        ResilientCall {
            breaker: CircuitBreaker::with_clock(self.name.clone(), self.breaker, Arc::clone(&clock)),
            policy: RetryPolicy::new(self.retry),
            events: EventBus::new(self.event_capacity),
            name: self.name,
            clock,
        }
    }
}
