//! Session notifications
//!
//! Components report state changes through [`NotificationSink`]. The default
//! sink is [`EventBus`], which fans every event out to all current
//! subscribers over a Tokio broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Something subscribers may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session token was replaced; `expires_at` is in seconds
    TokenRenewed { expires_at: i64 },
    /// Renewal failed and the session token is gone
    TokenExpired { reason: String },
    /// A reconnection probe succeeded after `attempts` probes
    ReconnectSucceeded { attempts: u32 },
    /// A probe failed; the next one runs after `next_delay`
    ReconnectFailed { attempt: u32, next_delay: Duration },
    /// The cycle gave up after `attempts` consecutive failures
    ReconnectPermanentFailure { attempts: u32 },
}

impl SessionEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::TokenRenewed { .. } => "token-renewed",
            Self::TokenExpired { .. } => "token-expired",
            Self::ReconnectSucceeded { .. } => "reconnect-succeeded",
            Self::ReconnectFailed { .. } => "reconnect-failed",
            Self::ReconnectPermanentFailure { .. } => "reconnect-permanent-failure",
        }
    }
}

/// Receiver of session events
pub trait NotificationSink: Send + Sync {
    /// Deliver one event; must not block
    fn notify(&self, event: SessionEvent);
}

/// Broadcast sink delivering each event to every live subscriber
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, event: SessionEvent) {
        let name = event.name();
        // No subscribers is not an error
        if self.sender.send(event).is_err() {
            trace!(event = name, "event dropped, no subscribers");
        }
    }
}

/// Sink that forwards every event to each of its targets in order
pub struct FanOut {
    targets: Vec<Arc<dyn NotificationSink>>,
}

impl FanOut {
    /// Forward to `targets`, first to last
    pub fn new(targets: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { targets }
    }
}

impl NotificationSink for FanOut {
    fn notify(&self, event: SessionEvent) {
        if let Some((last, rest)) = self.targets.split_last() {
            for target in rest {
                target.notify(event.clone());
            }
            last.notify(event);
        }
    }
}
