//! Time abstractions for retry backoff and circuit breaker timers.
//!
//! Production code uses [`TokioClock`]. Tests inject [`ManualClock`], which
//! only moves when told to, fires due timers synchronously, and records every
//! backoff sleep so delays can be asserted without waiting for them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lock;

/// Future returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback fired by [`Clock::schedule_after`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Injectable time source.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    fn sleep(&self, duration: Duration) -> Sleep;

    /// Run `callback` once `delay` has elapsed, unless the returned handle is
    /// cancelled or dropped first.
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Handle to a pending timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, task }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Clock backed by tokio's timer wheel.
///
/// Honors `tokio::time::pause`, so `#[tokio::test(start_paused = true)]`
/// drives it deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }

    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                if !flag.load(Ordering::SeqCst) {
                    callback();
                }
            })),
            Err(_) => {
                // Without a runtime only the lazy check on the next call applies.
                tracing::debug!(
                    delay_ms = delay.as_millis() as u64,
                    "timer_skipped_no_runtime"
                );
                None
            }
        };

        TimerHandle::new(cancelled, task)
    }
}

struct PendingTimer {
    due: Duration,
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

/// Virtual clock for tests.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualInner>,
}

struct ManualInner {
    origin: Instant,
    elapsed: Mutex<Duration>,
    timers: Mutex<Vec<PendingTimer>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualInner {
                origin: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                timers: Mutex::new(Vec::new()),
                sleeps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Move virtual time forward and fire every timer that became due, in
    /// deadline order.
    pub fn advance(&self, by: Duration) {
        let now = {
            let mut elapsed = lock(&self.inner.elapsed);
            *elapsed += by;
            *elapsed
        };

        let mut due: Vec<PendingTimer> = {
            let mut timers = lock(&self.inner.timers);
            let (due, pending): (Vec<_>, Vec<_>) =
                timers.drain(..).partition(|timer| timer.due <= now);
            *timers = pending;
            due
        };
        due.sort_by_key(|timer| timer.due);

        // Callbacks run with no clock lock held; they may schedule new timers.
        for timer in due {
            if !timer.cancelled.load(Ordering::SeqCst) {
                (timer.callback)();
            }
        }
    }

    /// Total virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.inner.elapsed)
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.inner.sleeps).clone()
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending_timers(&self) -> usize {
        lock(&self.inner.timers)
            .iter()
            .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        lock(&self.inner.sleeps).push(duration);
        self.advance(duration);
        Box::pin(std::future::ready(()))
    }

    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let due = self.elapsed() + delay;
        lock(&self.inner.timers).push(PendingTimer {
            due,
            cancelled: Arc::clone(&cancelled),
            callback,
        });
        TimerHandle::new(cancelled, None)
    }
}
