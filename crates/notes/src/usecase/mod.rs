//! Use cases: validated, single-flight entry points for the front end.
//!
//! Every use case instance runs at most one call at a time. What happens to
//! a second call that arrives while the first is still running depends on
//! the use case's [`BusyPolicy`]:
//!
//! | Use case         | Policy   |
//! |------------------|----------|
//! | `RegisterUser`   | Reject   |
//! | `SignIn`         | Reject   |
//! | `SignOut`        | Ignore   |
//! | `GetCurrentUser` | Ignore   |
//! | `CreateNote`     | Reject   |
//! | `ListNotes`      | Ignore   |
//! | `UpdateNote`     | Reject   |
//! | `DeleteNote`     | Ignore   |
//! | `CreateTask`     | Reject   |
//! | `ListTasks`      | Ignore   |
//! | `UpdateTask`     | Reject   |
//! | `CompleteTask`   | Ignore   |
//! | `DeleteTask`     | Ignore   |
//!
//! Calls that create or change data with caller-supplied input are rejected
//! so the caller learns the input was not applied. Reads and idempotent
//! actions are ignored: the running call already produces the result.
//!
//! Each use case publishes its own `OperationInProgress`, `OperationSuccess`
//! and `OperationFailure` events. Retry and breaker detail stays on the
//! repository buses.

mod notes;
mod tasks;
mod user;

pub use notes::{CreateNote, DeleteNote, ListNotes, UpdateNote};
pub use tasks::{CompleteTask, CreateTask, DeleteTask, ListTasks, UpdateTask};
pub use user::{GetCurrentUser, RegisterUser, SignIn, SignOut};

use resilience::{DomainEvent, EventBus};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::error::NotesError;

/// What a use case does with a call that arrives while it is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Return [`Execution::Ignored`] without doing anything.
    Ignore,
    /// Fail with [`NotesError::Busy`].
    Reject,
}

/// Result of an ignore-policy use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution<T> {
    Done(T),
    /// Another call was already running; this one did nothing.
    Ignored,
}

impl<T> Execution<T> {
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Ignored => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

/// Per-instance in-flight flag.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    running: AtomicBool,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag. `None` when a call is already running.
    pub fn try_acquire(&self) -> Option<ExecutionToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExecutionToken {
                running: &self.running,
            })
    }

    pub fn is_executing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Clears the flag when dropped, on every exit path including cancellation.
#[derive(Debug)]
pub struct ExecutionToken<'a> {
    running: &'a AtomicBool,
}

impl Drop for ExecutionToken<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Shared machinery of every use case: single-flight guard, busy policy and
/// lifecycle events under the use case's operation name.
#[derive(Debug)]
pub struct Interactor {
    operation: &'static str,
    policy: BusyPolicy,
    guard: ExecutionGuard,
    events: EventBus<DomainEvent>,
}

impl Interactor {
    pub fn new(operation: &'static str, policy: BusyPolicy, event_capacity: usize) -> Self {
        Self {
            operation,
            policy,
            guard: ExecutionGuard::new(),
            events: EventBus::new(event_capacity),
        }
    }

    /// Interactor carrying `U`'s operation name and busy policy.
    pub fn for_use_case<U: UseCase>(event_capacity: usize) -> Self {
        Self::new(U::OPERATION, U::BUSY_POLICY, event_capacity)
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        &self.events
    }

    pub fn is_executing(&self) -> bool {
        self.guard.is_executing()
    }

    /// Run `work` unless a call is in flight. A busy call is handled per
    /// the policy: `Ignore` returns [`Execution::Ignored`], `Reject` fails
    /// with [`NotesError::Busy`] and publishes it as a failure.
    pub async fn run<T, F, Fut>(&self, work: F) -> Result<Execution<T>, NotesError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NotesError>>,
    {
        let Some(_token) = self.guard.try_acquire() else {
            return match self.policy {
                BusyPolicy::Ignore => {
                    debug!(operation = self.operation, "use_case_busy_ignored");
                    Ok(Execution::Ignored)
                }
                BusyPolicy::Reject => Err(self.reject_busy()),
            };
        };
        self.perform(work()).await.map(Execution::Done)
    }

    /// [`Interactor::run`] for callers that need the value. An ignored call
    /// surfaces as [`NotesError::Busy`].
    pub async fn run_for_value<T, F, Fut>(&self, work: F) -> Result<T, NotesError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NotesError>>,
    {
        match self.run(work).await? {
            Execution::Done(value) => Ok(value),
            Execution::Ignored => Err(NotesError::Busy {
                operation: self.operation,
            }),
        }
    }

    fn reject_busy(&self) -> NotesError {
        let err = NotesError::Busy {
            operation: self.operation,
        };
        warn!(operation = self.operation, "use_case_busy_rejected");
        self.events.publish(DomainEvent::OperationFailure {
            operation: self.operation.to_owned(),
            message: err.to_string(),
        });
        err
    }

    async fn perform<T, Fut>(&self, work: Fut) -> Result<T, NotesError>
    where
        T: Serialize,
        Fut: Future<Output = Result<T, NotesError>>,
    {
        self.events.publish(DomainEvent::OperationInProgress {
            operation: self.operation.to_owned(),
        });
        match work.await {
            Ok(value) => {
                self.events.publish(DomainEvent::OperationSuccess {
                    operation: self.operation.to_owned(),
                    data: serde_json::to_value(&value).unwrap_or(serde_json::Value::Null),
                });
                Ok(value)
            }
            Err(err) => {
                debug!(operation = self.operation, error = %err, "use_case_failed");
                self.events.publish(DomainEvent::OperationFailure {
                    operation: self.operation.to_owned(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

/// Common surface of every use case.
pub trait UseCase {
    /// Name used in this use case's events.
    const OPERATION: &'static str;
    const BUSY_POLICY: BusyPolicy;

    fn interactor(&self) -> &Interactor;

    fn events(&self) -> &EventBus<DomainEvent> {
        self.interactor().events()
    }

    fn is_executing(&self) -> bool {
        self.interactor().is_executing()
    }
}
