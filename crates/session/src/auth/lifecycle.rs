//! Session token lifecycle with proactive renewal
//!
//! The manager keeps the current [`IssuedToken`] and at most one pending
//! renewal timer:
//! - a token whose renewal anchor is closer than the immediate threshold
//!   (5 min by default) is renewed inline, before `on_token_issued` returns
//! - any other token gets a single-shot timer firing `renewal_lead` (1 h by
//!   default) before the anchor; a deadline already in the past fires at once
//! - a failed renewal clears the token, moves to [`TokenState::Expired`] and
//!   emits `token-expired`; nothing retries automatically
//!
//! Every change to the token or timer bumps a generation counter under the
//! state lock. Timer callbacks and in-flight renewals carry the generation
//! they were started with and give up when it no longer matches.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rainbow_common::time::{Clock, TimerHandle, TimerScheduler};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::credentials::bearer_headers;
use super::token::{IssuedToken, TokenClaims, TokenDecoder};
use super::RENEW_PATH;
use crate::config::{RenewalAnchor, TokenConfig};
use crate::errors::{SessionError, SessionResult};
use crate::events::{NotificationSink, SessionEvent};
use crate::transport::{Transport, TransportError};

/// Renewals in a row that may themselves land inside the renewal window
const MAX_INLINE_RENEWALS: u32 = 5;

/// Where the token lifecycle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token is held
    Unauthenticated,
    /// A renewal timer is armed for the current token
    Scheduled,
    /// A renewal request is in flight
    Renewing,
    /// Renewal failed and the token was dropped
    Expired,
}

/// Exchanges the current token for a fresh one
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Return the replacement for `current_token`
    async fn renew(&self, current_token: &str) -> Result<String, TransportError>;
}

/// Renews through the platform's renew endpoint
pub struct TransportRenewer {
    transport: Arc<dyn Transport>,
}

impl TransportRenewer {
    /// Renewer sending its requests through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRenewer for TransportRenewer {
    async fn renew(&self, current_token: &str) -> Result<String, TransportError> {
        let response = self.transport.get(RENEW_PATH, &bearer_headers(current_token)).await?;
        response
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransportError::decode(RENEW_PATH, "renew response carries no token"))
    }
}

enum RenewalPlan {
    Immediate,
    After(Duration),
}

struct LifecycleState {
    state: TokenState,
    current: Option<IssuedToken>,
    timer: Option<TimerHandle>,
    generation: u64,
}

impl LifecycleState {
    /// Invalidate the pending timer and any in-flight work
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation
    }
}

/// Tracks the session token and schedules its renewal
pub struct TokenLifecycleManager {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn TimerScheduler>,
    decoder: Arc<dyn TokenDecoder>,
    renewer: Arc<dyn TokenRenewer>,
    sink: Arc<dyn NotificationSink>,
    inner: Mutex<LifecycleState>,
    this: Weak<Self>,
}

impl TokenLifecycleManager {
    /// Create a manager holding no token
    pub fn new(
        config: TokenConfig,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn TimerScheduler>,
        decoder: Arc<dyn TokenDecoder>,
        renewer: Arc<dyn TokenRenewer>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            clock,
            scheduler,
            decoder,
            renewer,
            sink,
            inner: Mutex::new(LifecycleState {
                state: TokenState::Unauthenticated,
                current: None,
                timer: None,
                generation: 0,
            }),
            this: this.clone(),
        })
    }

    /// Start tracking a freshly issued token
    ///
    /// Fails with [`SessionError::TokenFormat`] when the token's claims cannot
    /// be read, in which case nothing changes. When the token is already
    /// inside the renewal window the renewal runs before this returns.
    #[instrument(skip_all)]
    pub async fn on_token_issued(&self, token: String) -> SessionResult<()> {
        let claims = self.decoder.decode(&token)?;
        self.track(IssuedToken::new(token, claims)).await
    }

    /// Renew the current token now and reschedule from the new one
    #[instrument(skip(self))]
    pub async fn renew(&self) -> SessionResult<()> {
        let renewed = self.renew_current().await?;
        self.track(renewed).await
    }

    /// Drop the token and cancel any pending renewal
    ///
    /// Once this returns no scheduled renewal can fire for the dropped token.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.supersede();
        inner.current = None;
        inner.state = TokenState::Unauthenticated;
        debug!("token lifecycle cancelled");
    }

    /// Current lifecycle state
    pub fn state(&self) -> TokenState {
        self.inner.lock().state
    }

    /// The tracked token and its claims
    pub fn current(&self) -> Option<IssuedToken> {
        self.inner.lock().current.clone()
    }

    /// Raw bearer token, if one is held
    pub fn token(&self) -> Option<String> {
        self.inner.lock().current.as_ref().map(|t| t.token().to_string())
    }

    /// Whether a renewal timer is armed
    pub fn has_pending_renewal(&self) -> bool {
        self.inner.lock().timer.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    async fn track(&self, mut issued: IssuedToken) -> SessionResult<()> {
        let mut inline_renewals = 0;
        loop {
            match self.plan(issued.claims()) {
                RenewalPlan::After(delay) => {
                    self.install(issued, delay);
                    return Ok(());
                }
                RenewalPlan::Immediate => {
                    if inline_renewals == MAX_INLINE_RENEWALS {
                        let reason = format!(
                            "{inline_renewals} consecutive renewals returned tokens inside the renewal window"
                        );
                        self.expire(&reason);
                        return Err(SessionError::TokenExpired { reason });
                    }
                    inline_renewals += 1;
                    warn!(expires_at = issued.expires_at(), "token inside renewal window, renewing now");
                    {
                        let mut inner = self.inner.lock();
                        inner.supersede();
                        inner.current = Some(issued);
                        inner.state = TokenState::Renewing;
                    }
                    issued = self.renew_current().await?;
                }
            }
        }
    }

    fn plan(&self, claims: TokenClaims) -> RenewalPlan {
        let anchor_secs = match self.config.anchor {
            RenewalAnchor::Expiry => claims.exp,
            RenewalAnchor::HalfLife => claims.half_life(),
        };
        let anchor_ms = anchor_secs.saturating_mul(1_000);
        let now_ms = i64::try_from(self.clock.millis_since_epoch()).unwrap_or(i64::MAX);
        let remaining_ms = anchor_ms.saturating_sub(now_ms);

        let threshold_ms = secs_to_millis(self.config.immediate_threshold_secs);
        if remaining_ms < threshold_ms {
            return RenewalPlan::Immediate;
        }

        let lead_ms = secs_to_millis(self.config.renewal_lead_secs);
        let delay_ms = remaining_ms.saturating_sub(lead_ms).max(0);
        RenewalPlan::After(Duration::from_millis(delay_ms as u64))
    }

    fn install(&self, issued: IssuedToken, delay: Duration) {
        let mut inner = self.inner.lock();
        let generation = inner.supersede();

        let this = self.this.clone();
        let handle = self.scheduler.schedule(
            delay,
            Box::pin(async move {
                if let Some(manager) = this.upgrade() {
                    manager.fire(generation).await;
                }
            }),
        );

        info!(
            expires_at = issued.expires_at(),
            delay_ms = delay.as_millis() as u64,
            "token renewal scheduled"
        );
        inner.timer = Some(handle);
        inner.current = Some(issued);
        inner.state = TokenState::Scheduled;
    }

    async fn fire(&self, generation: u64) {
        if self.inner.lock().generation != generation {
            debug!("stale renewal timer ignored");
            return;
        }
        if let Err(err) = self.renew().await {
            warn!(error = %err, "scheduled token renewal failed");
        }
    }

    async fn renew_current(&self) -> SessionResult<IssuedToken> {
        let (current, generation) = {
            let mut inner = self.inner.lock();
            let Some(current) = inner.current.as_ref().map(|t| t.token().to_string()) else {
                return Err(SessionError::NotSignedIn);
            };
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            inner.state = TokenState::Renewing;
            (current, inner.generation)
        };

        info!("renewing session token");
        let outcome = match self.renewer.renew(&current).await {
            Ok(token) => self
                .decoder
                .decode(&token)
                .map(|claims| IssuedToken::new(token, claims))
                .map_err(SessionError::from),
            Err(err) => Err(SessionError::TokenExpired { reason: err.to_string() }),
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("renewal result discarded, token was replaced meanwhile");
            return inner.current.clone().ok_or(SessionError::NotSignedIn);
        }

        match outcome {
            Ok(renewed) => {
                inner.current = Some(renewed.clone());
                drop(inner);
                info!(expires_at = renewed.expires_at(), "session token renewed");
                self.sink.notify(SessionEvent::TokenRenewed { expires_at: renewed.expires_at() });
                Ok(renewed)
            }
            Err(err) => {
                drop(inner);
                self.expire(&err.to_string());
                Err(err)
            }
        }
    }

    fn expire(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            inner.supersede();
            inner.current = None;
            inner.state = TokenState::Expired;
        }
        warn!(reason, "session token expired");
        self.sink.notify(SessionEvent::TokenExpired { reason: reason.to_string() });
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1_000)
}
