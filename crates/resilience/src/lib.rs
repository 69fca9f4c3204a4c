//! Resilience primitives for calls to remote services.
//!
//! - [`RetryPolicy`]: exponential backoff and retry classification
//! - [`CircuitBreaker`]: fail fast against a dependency that keeps failing
//! - [`EventBus`]: bounded broadcast of operation lifecycle events
//! - [`ResilientCall`]: retry inside a breaker, publishing [`DomainEvent`]s
//!
//! Time is injected through [`Clock`], so every timing behavior can be
//! driven by [`ManualClock`] in tests.
//!
//! ```no_run
//! use resilience::{CircuitBreakerConfig, ResilientCall, RetryConfig, TransportError};
//!
//! # async fn demo() -> Result<(), resilience::CallError> {
//! let call = ResilientCall::new("notes", RetryConfig::default(), CircuitBreakerConfig::default());
//! let mut events = call.events().subscribe();
//!
//! let count = call
//!     .run("notes.count", || async { Ok::<_, TransportError>(3u32) })
//!     .await?;
//! assert_eq!(count, 3);
//! while let Some(event) = events.try_recv() {
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod events;
pub mod retry;

mod serde_millis;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use call::{ResilientCall, ResilientCallBuilder};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitEvent, CircuitSnapshot, CircuitState,
};
pub use clock::{Clock, ManualClock, TimerHandle, TokioClock};
pub use error::{BreakerError, CallError, ConfigError, ErrorKind, TransportError};
pub use events::{DomainEvent, EventBus, Listener, Subscription, DEFAULT_CAPACITY};
pub use retry::{is_retryable, RetryConfig, RetryPolicy};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
