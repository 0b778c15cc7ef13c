//! Integration tests for clocks and timer schedulers

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rainbow_common::testing::{ManualScheduler, MockClock};
use rainbow_common::time::{Clock, TimerHandle, TimerScheduler, TokioScheduler};

fn counting_task(counter: &Arc<AtomicU32>) -> rainbow_common::time::TimerTask {
    let counter = Arc::clone(counter);
    Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Validates cancel-then-reschedule against the manual scheduler.
///
/// # Test Steps
/// 1. Schedule a task at 1h and cancel it
/// 2. Schedule a replacement at 2h
/// 3. Advance 3h
///
/// Assertions:
/// - Only the replacement runs.
#[tokio::test]
async fn test_cancel_then_reschedule_runs_only_replacement() {
    let scheduler = ManualScheduler::new();
    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));

    let handle = scheduler.schedule(Duration::from_secs(3_600), counting_task(&first));
    handle.cancel();
    scheduler.schedule(Duration::from_secs(7_200), counting_task(&second));

    assert_eq!(scheduler.advance(Duration::from_secs(10_800)).await, 1);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

/// Validates a task that schedules a follow-up during `advance`.
///
/// Assertions:
/// - The follow-up runs in the same `advance` when it falls due in range.
/// - The clock paired with the scheduler ends at the target time.
#[tokio::test]
async fn test_chained_tasks_within_one_advance() {
    let clock = MockClock::at_unix_millis(0);
    let scheduler = Arc::new(ManualScheduler::with_clock(clock.clone()));
    let counter = Arc::new(AtomicU32::new(0));

    let chained_scheduler = Arc::clone(&scheduler);
    let chained_counter = Arc::clone(&counter);
    scheduler.schedule(
        Duration::from_secs(1),
        Box::pin(async move {
            chained_counter.fetch_add(1, Ordering::SeqCst);
            chained_scheduler.schedule(Duration::from_secs(1), counting_task(&chained_counter));
        }),
    );

    assert_eq!(scheduler.advance(Duration::from_secs(5)).await, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(clock.millis_since_epoch(), 5_000);
}

/// Validates the Tokio scheduler with paused time.
///
/// Assertions:
/// - A cancelled timer never fires, a live one fires once.
#[tokio::test(start_paused = true)]
async fn test_tokio_scheduler_with_paused_time() {
    let scheduler = TokioScheduler::new();
    let fired = Arc::new(AtomicU32::new(0));
    let cancelled = Arc::new(AtomicU32::new(0));

    let live: TimerHandle = scheduler.schedule(Duration::from_secs(60), counting_task(&fired));
    let dead = scheduler.schedule(Duration::from_secs(30), counting_task(&cancelled));
    dead.cancel();

    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    assert!(!live.is_cancelled());
}
