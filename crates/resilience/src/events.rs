//! Operation lifecycle events and the broadcast bus that carries them.
//!
//! Every component that performs operations owns an [`EventBus`]. Observers
//! either pull from a [`Subscription`] or register a callback with
//! [`EventBus::listen`]. Both registrations end when the handle is dropped.
//!
//! ```text
//!  ResilientCall ──publish──▶ EventBus<DomainEvent> ──▶ Subscription (pull)
//!                                     │
//!                                     └──────────────▶ Listener (callback task)
//! ```
//!
//! The bus is bounded. A subscriber that falls behind loses the oldest events
//! instead of stalling the publisher or other subscribers.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Buffer size used when an owner does not pick one.
pub const DEFAULT_CAPACITY: usize = 64;

/// Phase change of a single operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OperationInProgress {
        operation: String,
    },
    OperationSuccess {
        operation: String,
        data: serde_json::Value,
    },
    OperationFailure {
        operation: String,
        message: String,
    },
    RetryAttempt {
        operation: String,
        /// The attempt that just failed (1-based).
        attempt_number: u32,
        #[serde(with = "crate::serde_millis")]
        delay: Duration,
        cause: TransportError,
    },
    RetrySuccess {
        operation: String,
        total_attempts: u32,
    },
    RetryExhausted {
        operation: String,
        cause: TransportError,
        total_attempts: u32,
    },
}

impl DomainEvent {
    pub fn operation(&self) -> &str {
        match self {
            Self::OperationInProgress { operation }
            | Self::OperationSuccess { operation, .. }
            | Self::OperationFailure { operation, .. }
            | Self::RetryAttempt { operation, .. }
            | Self::RetrySuccess { operation, .. }
            | Self::RetryExhausted { operation, .. } => operation,
        }
    }

    /// Stable snake_case name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationInProgress { .. } => "operation_in_progress",
            Self::OperationSuccess { .. } => "operation_success",
            Self::OperationFailure { .. } => "operation_failure",
            Self::RetryAttempt { .. } => "retry_attempt",
            Self::RetrySuccess { .. } => "retry_success",
            Self::RetryExhausted { .. } => "retry_exhausted",
        }
    }

    /// Success and failure close an operation's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::OperationSuccess { .. } | Self::OperationFailure { .. }
        )
    }
}

/// Bounded multi-subscriber broadcast channel.
///
/// Cloning the bus shares the same channel, which is how an outer layer
/// relays an inner layer's events without copying them.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire-and-forget. Returns how many subscribers were registered.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Register a pull subscription. Only events published after this call
    /// are delivered.
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Deliver every event to `callback` on a background task.
    ///
    /// Registration happens before this returns, so nothing published
    /// afterwards is missed. Outside a tokio runtime there is nothing to
    /// run the task on: the returned listener is already finished and the
    /// callback never runs.
    pub fn listen<F>(&self, mut callback: F) -> Listener
    where
        F: FnMut(E) + Send + 'static,
    {
        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let mut subscription = self.subscribe();
                Some(runtime.spawn(async move {
                    while let Some(event) = subscription.recv().await {
                        callback(event);
                    }
                }))
            }
            Err(_) => {
                debug!("listener_skipped_no_runtime");
                None
            }
        };
        Listener { task }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Pull-style registration on an [`EventBus`]. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription<E> {
    receiver: broadcast::Receiver<E>,
}

impl<E> Subscription<E>
where
    E: Clone,
{
    /// Wait for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event_subscriber_lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event, if any.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event_subscriber_lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every event published so far and not yet received.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Release the registration.
    pub fn cancel(self) {}
}

/// Push-style registration created by [`EventBus::listen`].
///
/// Dropping or cancelling it stops the delivery task, so no callback runs
/// after the owner is gone.
#[derive(Debug)]
pub struct Listener {
    task: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn cancel(self) {}

    /// True once the bus closed, the listener was cancelled, or it was
    /// created without a runtime.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn in_progress(op: &str) -> DomainEvent {
        DomainEvent::OperationInProgress {
            operation: op.into(),
        }
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(in_progress("notes.list")), 2);

        assert_eq!(first.try_recv(), Some(in_progress("notes.list")));
        assert_eq!(second.try_recv(), Some(in_progress("notes.list")));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus: EventBus<DomainEvent> = EventBus::default();
        assert_eq!(bus.publish(in_progress("users.login")), 0);
    }

    #[test]
    fn cancelled_subscription_is_released() {
        let bus: EventBus<u32> = EventBus::new(4);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        sub.cancel();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn lagging_subscriber_skips_oldest_without_blocking() {
        let bus: EventBus<u32> = EventBus::new(2);
        let mut slow = bus.subscribe();
        for n in 0..5 {
            bus.publish(n);
        }
        assert_eq!(slow.drain(), vec![3, 4]);
    }

    #[test]
    fn cloned_bus_shares_the_channel() {
        let bus: EventBus<u32> = EventBus::new(4);
        let relay = bus.clone();
        let mut sub = relay.subscribe();

        bus.publish(7);
        assert_eq!(sub.try_recv(), Some(7));
    }

    #[tokio::test]
    async fn recv_ends_when_publishers_drop() {
        let bus: EventBus<u32> = EventBus::new(4);
        let mut sub = bus.subscribe();
        bus.publish(1);
        drop(bus);

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn listener_receives_until_cancelled() {
        let bus: EventBus<u32> = EventBus::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let listener = bus.listen(move |n| sink.lock().unwrap().push(n));
        bus.publish(1);
        bus.publish(2);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        listener.cancel();
        tokio::task::yield_now().await;
        bus.publish(3);
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn listen_outside_a_runtime_is_inert() {
        let bus: EventBus<u32> = EventBus::new(4);
        let listener = bus.listen(|_| unreachable!("no runtime to deliver on"));

        assert!(listener.is_finished());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(1), 0);
    }

    #[test]
    fn event_names_match_serialized_tags() {
        let event = DomainEvent::RetryAttempt {
            operation: "tasks.create".into(),
            attempt_number: 1,
            delay: Duration::from_millis(100),
            cause: TransportError::timeout("slow"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["delay"], 100);
        assert_eq!(event.operation(), "tasks.create");
        assert!(!event.is_terminal());
    }
}
