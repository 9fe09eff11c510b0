//! Deferred work for reconnect backoff and connection timeouts
//!
//! Timers are armed through a [`Scheduler`] and represented by a
//! [`TimerHandle`] that can be cancelled. The default [`TokioScheduler`]
//! runs on `tokio::time`, so tests drive it with a paused clock and
//! `tokio::time::advance`.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Source of time and one-shot deferred tasks
pub trait Scheduler: Send + Sync + 'static {
    /// Current instant on this scheduler's clock
    fn now(&self) -> Instant;

    /// Run `task` once after `delay`, unless the returned handle is cancelled first
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Cancellable handle to a scheduled task
pub struct TimerHandle {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Wrap a cancellation hook
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Process-unique identifier of this timer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task if it has not fired yet
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

/// Scheduler backed by the ambient tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        // Deadline fixed now, not when the spawned task is first polled
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });
        let abort = handle.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}
