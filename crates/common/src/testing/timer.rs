//! Virtual-time timer scheduler
//!
//! [`ManualScheduler`] records every scheduled task and only runs them when
//! the test calls [`ManualScheduler::advance`]. Tasks run inline, in due order
//! (ties broken by scheduling order), and tasks scheduled while advancing are
//! picked up in the same call if they fall due before the target time.
//!
//! Pair it with [`MockClock`] through [`ManualScheduler::with_clock`] so the
//! wall clock moves together with virtual time.
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rainbow_common::testing::ManualScheduler;
//! use rainbow_common::time::TimerScheduler;
//!
//! # tokio_test::block_on(async {
//! let scheduler = ManualScheduler::new();
//! let fired = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&fired);
//! scheduler.schedule(
//!     Duration::from_secs(10),
//!     Box::pin(async move {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }),
//! );
//!
//! assert_eq!(scheduler.advance(Duration::from_secs(9)).await, 0);
//! assert_eq!(scheduler.advance(Duration::from_secs(1)).await, 1);
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! # });
//! ```

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

use super::time::MockClock;
use crate::time::timer::{TimerHandle, TimerScheduler, TimerTask};

struct PendingTimer {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: TimerTask,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTimer>,
    requested: Vec<Duration>,
}

/// Timer scheduler driven by explicit calls to [`advance`](Self::advance)
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<SchedulerState>,
    clock: Option<MockClock>,
}

impl ManualScheduler {
    /// Scheduler with its own virtual time
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that advances `clock` as virtual time moves
    pub fn with_clock(clock: MockClock) -> Self {
        Self { state: Mutex::new(SchedulerState::default()), clock: Some(clock) }
    }

    /// Move virtual time forward by `by`, running every task that falls due
    ///
    /// Returns the number of tasks that ran. Cancelled tasks are discarded
    /// without running.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;

        while let Some(timer) = self.pop_due(target) {
            if timer.handle.is_cancelled() {
                continue;
            }
            timer.task.await;
            fired += 1;
        }

        self.move_to(target);
        fired
    }

    /// Run every task that is already due without moving time
    pub async fn run_due(&self) -> usize {
        self.advance(Duration::ZERO).await
    }

    /// Number of scheduled tasks that are neither fired nor cancelled
    pub fn pending(&self) -> usize {
        self.state.lock().pending.iter().filter(|t| !t.handle.is_cancelled()).count()
    }

    /// Delay until the earliest live task, if any
    pub fn next_due_in(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .map(|t| t.due.saturating_sub(state.now))
            .min()
    }

    /// Every delay passed to `schedule`, in call order
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.state.lock().requested.clone()
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.state.lock().now
    }

    fn pop_due(&self, target: Duration) -> Option<PendingTimer> {
        let timer = {
            let mut state = self.state.lock();
            let index = state
                .pending
                .iter()
                .enumerate()
                .filter(|(_, t)| t.due <= target)
                .min_by_key(|(_, t)| (t.due, t.seq))
                .map(|(i, _)| i)?;
            state.pending.swap_remove(index)
        };
        self.move_to(timer.due);
        Some(timer)
    }

    fn move_to(&self, instant: Duration) {
        let mut state = self.state.lock();
        if instant > state.now {
            let step = instant - state.now;
            state.now = instant;
            if let Some(clock) = &self.clock {
                clock.advance(step);
            }
        }
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.requested.push(delay);
        state.pending.push(PendingTimer { due, seq, handle: handle.clone(), task });
        handle
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .field("requested", &state.requested)
            .finish()
    }
}
