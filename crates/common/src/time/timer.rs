//! Cancellable one-shot timers
//!
//! A [`TimerScheduler`] runs a task once after a delay and hands back a
//! [`TimerHandle`]. Cancelling the handle guarantees the task will not start;
//! a task that already started runs to completion.
//!
//! [`TokioScheduler`] is the production implementation. Tests use
//! [`ManualScheduler`](crate::testing::ManualScheduler), which drives the same
//! trait from virtual time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{trace, warn};

/// Work executed when a timer fires
pub type TimerTask = BoxFuture<'static, ()>;

/// A handle that can be used to cancel a scheduled timer
#[derive(Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    sleeper: Option<AbortHandle>,
}

impl TimerHandle {
    /// Create a live handle not attached to any runtime task
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(sleeper) = &self.sleeper {
            sleeper.abort();
        }
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .field("attached", &self.sleeper.is_some())
            .finish()
    }
}

/// Schedules single-shot delayed tasks
pub trait TimerScheduler: Send + Sync {
    /// Run `task` once after `delay`; a zero delay fires as soon as possible
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Timer scheduler backed by the Tokio runtime
///
/// The delay is awaited in a dedicated task which is aborted on cancel. When
/// it elapses the work is spawned as its own task, so cancelling a handle
/// from inside the work it guards never interrupts that work.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Scheduler using whichever runtime is current at scheduling time
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler pinned to a specific runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle: Some(handle) }
    }

    fn runtime(&self) -> Option<Handle> {
        self.handle.clone().or_else(|| Handle::try_current().ok())
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let Some(runtime) = self.runtime() else {
            warn!(delay_ms = delay.as_millis() as u64, "no tokio runtime available, timer dropped");
            let handle = TimerHandle::new();
            handle.cancel();
            return handle;
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let spawner = runtime.clone();
        let sleeper = runtime.spawn(async move {
            sleep(delay).await;
            if flag.load(Ordering::SeqCst) {
                trace!("timer cancelled before firing");
                return;
            }
            spawner.spawn(task);
        });

        TimerHandle { cancelled, sleeper: Some(sleeper.abort_handle()) }
    }
}

/// Run `callback` once after `duration` on the current Tokio runtime
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use rainbow_common::time::timer::after;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = after(Duration::from_secs(5), || println!("fired"));
///     handle.cancel();
/// }
/// ```
pub fn after<F>(duration: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    TokioScheduler::new().schedule(duration, Box::pin(async move { callback() }))
}
