//! Connection-loss recovery
//!
//! [`ReconnectionController`] runs reconnection cycles. A cycle schedules a
//! [`HealthProbe`] after the next Fibonacci backoff delay and keeps
//! rescheduling it on failure until it succeeds or `max_attempts`
//! consecutive failures are reached.
//!
//! ```text
//! Idle ──trigger──> ProbeScheduled ──timer──> Probing ──ok──> Idle
//!                        ^                       │
//!                        └──────fail (< max)─────┤
//!                                                └──fail (= max)──> PermanentFailure
//! ```
//!
//! Only one cycle runs at a time. Any number of callers may await its outcome
//! through [`ReconnectionController::wait`].

pub mod probe;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rainbow_common::resilience::{BackoffConfig, BackoffStep, FibonacciBackoff};
use rainbow_common::time::{TimerHandle, TimerScheduler};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

pub use probe::{about_path, HealthProbe, PortalHealthProbe, ABOUT_SERVICES, PING_PATH};

use crate::events::{NotificationSink, SessionEvent};

/// Where the controller stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No cycle is running
    Idle,
    /// A probe is waiting on its backoff timer
    ProbeScheduled,
    /// A probe is in flight
    Probing,
    /// The last cycle exhausted its attempts
    PermanentFailure,
}

/// How the most recent cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// No cycle has run yet
    Idle,
    /// A probe succeeded; `attempts` probes ran in the cycle
    Reconnected { attempts: u32 },
    /// `attempts` consecutive probes failed
    PermanentFailure { attempts: u32 },
    /// The cycle was stopped before it finished
    Stopped,
}

struct ControllerState {
    state: ReconnectState,
    timer: Option<TimerHandle>,
    cycle: u64,
}

/// Fibonacci backoff state machine driving reconnection probes
pub struct ReconnectionController {
    backoff: Mutex<FibonacciBackoff>,
    probe: Arc<dyn HealthProbe>,
    scheduler: Arc<dyn TimerScheduler>,
    sink: Arc<dyn NotificationSink>,
    active: AtomicBool,
    inner: Mutex<ControllerState>,
    // `None` while a cycle is running
    outcome: watch::Sender<Option<ReconnectOutcome>>,
    this: Weak<Self>,
}

impl ReconnectionController {
    /// Create an idle controller; no probe runs until a cycle is triggered
    pub fn new(
        config: BackoffConfig,
        probe: Arc<dyn HealthProbe>,
        scheduler: Arc<dyn TimerScheduler>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let (outcome, _) = watch::channel(Some(ReconnectOutcome::Idle));
        Arc::new_cyclic(|this| Self {
            backoff: Mutex::new(FibonacciBackoff::new(config)),
            probe,
            scheduler,
            sink,
            active: AtomicBool::new(false),
            inner: Mutex::new(ControllerState {
                state: ReconnectState::Idle,
                timer: None,
                cycle: 0,
            }),
            outcome,
            this: this.clone(),
        })
    }

    /// Start a reconnection cycle unless one is already running
    ///
    /// Returns `true` when a new cycle was started.
    pub fn trigger_reconnect(&self) -> bool {
        if self.active.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("reconnection already in progress");
            return false;
        }

        let mut inner = self.inner.lock();
        let delay = {
            let mut backoff = self.backoff.lock();
            if inner.state == ReconnectState::PermanentFailure {
                backoff.reset();
            }
            backoff.next_delay()
        };
        inner.cycle += 1;
        let cycle = inner.cycle;
        self.outcome.send_replace(None);
        self.schedule_probe(&mut inner, cycle, delay);

        info!(delay_ms = delay.as_millis() as u64, "reconnection cycle started");
        true
    }

    /// Outcome of the running cycle, or of the last one if none is running
    pub async fn wait(&self) -> ReconnectOutcome {
        let mut receiver = self.outcome.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(ReconnectOutcome::Idle),
            Err(_) => ReconnectOutcome::Stopped,
        };
        outcome
    }

    /// Run a reconnection cycle to completion, joining one already running
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> ReconnectOutcome {
        self.trigger_reconnect();
        self.wait().await
    }

    /// Cancel the pending probe and abandon the running cycle
    ///
    /// A probe already in flight finishes but its result is ignored.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.cycle += 1;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        let was_running =
            matches!(inner.state, ReconnectState::ProbeScheduled | ReconnectState::Probing);
        inner.state = ReconnectState::Idle;
        self.backoff.lock().reset();
        if was_running {
            self.outcome.send_replace(Some(ReconnectOutcome::Stopped));
        }
        self.active.store(false, Ordering::SeqCst);
        drop(inner);

        if was_running {
            debug!("reconnection cycle stopped");
        }
    }

    /// Current position in the reconnection state machine
    pub fn state(&self) -> ReconnectState {
        self.inner.lock().state
    }

    /// Consecutive failed probes in the current streak
    pub fn attempts(&self) -> u32 {
        self.backoff.lock().attempts()
    }

    /// Whether a cycle is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn schedule_probe(&self, inner: &mut ControllerState, cycle: u64, delay: Duration) {
        let this = self.this.clone();
        let handle = self.scheduler.schedule(
            delay,
            Box::pin(async move {
                if let Some(controller) = this.upgrade() {
                    controller.run_probe(cycle).await;
                }
            }),
        );
        inner.timer = Some(handle);
        inner.state = ReconnectState::ProbeScheduled;
    }

    #[instrument(skip(self))]
    async fn run_probe(&self, cycle: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.cycle != cycle || inner.state != ReconnectState::ProbeScheduled {
                debug!("stale reconnection probe ignored");
                return;
            }
            inner.timer = None;
            inner.state = ReconnectState::Probing;
        }

        let result = self.probe.check().await;

        let mut inner = self.inner.lock();
        if inner.cycle != cycle {
            debug!("probe result discarded, cycle was stopped");
            return;
        }

        match result {
            Ok(()) => {
                let attempts = {
                    let mut backoff = self.backoff.lock();
                    let attempts = backoff.attempts() + 1;
                    backoff.reset();
                    attempts
                };
                inner.state = ReconnectState::Idle;
                // published before a new cycle can reset it
                self.outcome.send_replace(Some(ReconnectOutcome::Reconnected { attempts }));
                self.active.store(false, Ordering::SeqCst);
                drop(inner);

                info!(attempts, "reconnected");
                self.sink.notify(SessionEvent::ReconnectSucceeded { attempts });
            }
            Err(err) => {
                let step = self.backoff.lock().record_failure();
                match step {
                    BackoffStep::Retry { attempt, delay } => {
                        self.schedule_probe(&mut inner, cycle, delay);
                        drop(inner);

                        warn!(
                            attempt,
                            next_delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "reconnection probe failed"
                        );
                        self.sink.notify(SessionEvent::ReconnectFailed { attempt, next_delay: delay });
                    }
                    BackoffStep::Exhausted { attempts } => {
                        inner.timer = None;
                        inner.state = ReconnectState::PermanentFailure;
                        self.outcome
                            .send_replace(Some(ReconnectOutcome::PermanentFailure { attempts }));
                        self.active.store(false, Ordering::SeqCst);
                        drop(inner);

                        error!(attempts, error = %err, "reconnection abandoned");
                        self.sink.notify(SessionEvent::ReconnectPermanentFailure { attempts });
                    }
                }
            }
        }
    }
}
