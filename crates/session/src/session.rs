//! Session facade
//!
//! [`SessionFacade`] composes the token lifecycle, the reconnection
//! controller and the pagination loop around one injected [`Transport`]:
//!
//! - `sign_in` stores the signed-in profile and hands the token to the
//!   lifecycle manager, which schedules its own renewals
//! - connectivity failures on any request start a reconnection cycle and
//!   surface as [`SessionError::Network`]
//! - `sign_out` cancels the renewal timer and any pending probe before it
//!   sends anything
//!
//! All state changes are published as [`SessionEvent`]s to subscribers.

use std::sync::Arc;

use parking_lot::Mutex;
use rainbow_common::time::{Clock, SystemClock, TimerScheduler, TokioScheduler};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::auth::{
    bearer_headers, login_headers, ApplicationIdentity, Credentials, IssuedToken,
    JwtClaimsDecoder, TokenDecoder, TokenLifecycleManager, TokenRenewer, TokenState,
    TransportRenewer, LOGIN_PATH, LOGOUT_PATH,
};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::events::{EventBus, FanOut, NotificationSink, SessionEvent, DEFAULT_EVENT_CAPACITY};
use crate::pagination::{PageResult, PaginatedAggregator};
use crate::reconnect::{
    HealthProbe, PortalHealthProbe, ReconnectOutcome, ReconnectState, ReconnectionController,
};
use crate::transport::{Method, Transport, TransportError};

/// The signed-in account as returned by the login endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// `loggedInUser` document
    pub account: Value,
    /// `loggedInApplication` document
    pub application: Value,
    /// Current bearer token
    pub token: IssuedToken,
}

/// Result of a successful sign-in
#[derive(Debug, Clone, PartialEq)]
pub struct SignInResponse {
    /// `loggedInUser` document
    pub account: Value,
    /// `loggedInApplication` document
    pub application: Value,
    /// Token expiry in seconds since the UNIX epoch
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
struct Profile {
    account: Value,
    application: Value,
}

/// Entry point of the session layer
pub struct SessionFacade {
    credentials: Credentials,
    application: ApplicationIdentity,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    lifecycle: Arc<TokenLifecycleManager>,
    reconnect: Arc<ReconnectionController>,
    aggregator: PaginatedAggregator,
    profile: Mutex<Option<Profile>>,
}

impl SessionFacade {
    /// Facade with production defaults for clock, timers and probes
    pub fn new(
        config: SessionConfig,
        credentials: Credentials,
        application: ApplicationIdentity,
        transport: Arc<dyn Transport>,
    ) -> SessionResult<Self> {
        Self::builder(config, credentials, application, transport).build()
    }

    /// Builder accepting test doubles for every collaborator
    pub fn builder(
        config: SessionConfig,
        credentials: Credentials,
        application: ApplicationIdentity,
        transport: Arc<dyn Transport>,
    ) -> SessionFacadeBuilder {
        SessionFacadeBuilder {
            config,
            credentials,
            application,
            transport,
            clock: None,
            scheduler: None,
            decoder: None,
            probe: None,
            renewer: None,
            sink: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Log in with the configured credentials
    ///
    /// Rejected credentials yield [`SessionError::Authentication`]; an
    /// unreachable platform yields [`SessionError::Network`] and starts a
    /// reconnection cycle.
    #[instrument(skip(self), fields(login = %self.credentials.login()))]
    pub async fn sign_in(&self) -> SessionResult<SignInResponse> {
        let headers = login_headers(&self.credentials, &self.application);
        let response = match self.transport.get(LOGIN_PATH, &headers).await {
            Ok(response) => response,
            Err(err) if err.is_auth_rejection() => {
                warn!(status = err.status, "credentials rejected");
                return Err(SessionError::Authentication {
                    status: err.status.unwrap_or_default(),
                    message: err.message,
                });
            }
            Err(err) => return Err(self.route_failure(err)),
        };

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SessionError::Transport(TransportError::decode(
                    LOGIN_PATH,
                    "login response carries no token",
                ))
            })?
            .to_string();
        let account = response.get("loggedInUser").cloned().unwrap_or(Value::Null);
        let application = response.get("loggedInApplication").cloned().unwrap_or(Value::Null);

        self.lifecycle.on_token_issued(token).await?;
        let expires_at =
            self.lifecycle.current().map(|t| t.expires_at()).ok_or(SessionError::NotSignedIn)?;

        *self.profile.lock() =
            Some(Profile { account: account.clone(), application: application.clone() });
        info!(expires_at, "signed in");

        Ok(SignInResponse { account, application, expires_at })
    }

    /// Log out and drop the session
    ///
    /// The renewal timer and any pending reconnection probe are cancelled
    /// before the logout request is sent. Signing out while signed out only
    /// logs a warning.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> SessionResult<()> {
        let token = self.lifecycle.token();
        self.lifecycle.cancel();
        self.reconnect.stop();

        let Some(token) = token else {
            warn!("sign-out requested while not signed in");
            self.profile.lock().take();
            return Ok(());
        };

        let result = self.transport.get(LOGOUT_PATH, &bearer_headers(&token)).await;
        self.profile.lock().take();
        result.map_err(SessionError::from)?;

        info!("signed out");
        Ok(())
    }

    /// Renew the session token now
    #[instrument(skip(self))]
    pub async fn renew_token(&self) -> SessionResult<()> {
        self.lifecycle.renew().await
    }

    /// Run a reconnection cycle to completion
    ///
    /// Joins the running cycle if there is one.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> SessionResult<()> {
        match self.reconnect.reconnect().await {
            ReconnectOutcome::Reconnected { .. } | ReconnectOutcome::Idle => Ok(()),
            ReconnectOutcome::PermanentFailure { attempts } => {
                Err(SessionError::PermanentReconnectFailure { attempts })
            }
            // only sign-out stops a cycle
            ReconnectOutcome::Stopped => Err(SessionError::NotSignedIn),
        }
    }

    /// Authenticated GET
    #[instrument(skip(self))]
    pub async fn get(&self, path: &str) -> SessionResult<Value> {
        self.authorized(Method::Get, path, None).await
    }

    /// Authenticated POST
    #[instrument(skip(self, body))]
    pub async fn post(&self, path: &str, body: Option<&Value>) -> SessionResult<Value> {
        self.authorized(Method::Post, path, body).await
    }

    /// Authenticated PUT
    #[instrument(skip(self, body))]
    pub async fn put(&self, path: &str, body: Option<&Value>) -> SessionResult<Value> {
        self.authorized(Method::Put, path, body).await
    }

    /// Authenticated DELETE
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> SessionResult<Value> {
        self.authorized(Method::Delete, path, None).await
    }

    /// Fetch every item of a listing endpoint
    ///
    /// Pages are requested with `format=full&offset=<o>&limit=<l>` appended to
    /// `path` and must use the `{"data": [...], "total": n}` envelope.
    #[instrument(skip(self))]
    pub async fn fetch_collection(&self, path: &str) -> SessionResult<Vec<Value>> {
        let separator = if path.contains('?') { '&' } else { '?' };
        self.aggregator
            .fetch_all(|cursor| {
                let page_path = format!(
                    "{path}{separator}format=full&offset={}&limit={}",
                    cursor.offset, cursor.limit
                );
                async move {
                    let envelope = self.authorized(Method::Get, &page_path, None).await?;
                    Ok::<_, SessionError>(PageResult::from_envelope(&page_path, envelope)?)
                }
            })
            .await
    }

    /// Receive every session event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the signed-in session
    pub fn session(&self) -> Option<Session> {
        let profile = self.profile.lock().clone()?;
        let token = self.lifecycle.current()?;
        Some(Session { account: profile.account, application: profile.application, token })
    }

    /// Whether a token is held
    pub fn is_signed_in(&self) -> bool {
        self.profile.lock().is_some() && self.lifecycle.token().is_some()
    }

    /// Token lifecycle state
    pub fn token_state(&self) -> TokenState {
        self.lifecycle.state()
    }

    /// Reconnection state
    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect.state()
    }

    /// Identifier of the signed-in account
    pub fn user_id(&self) -> Option<String> {
        self.profile
            .lock()
            .as_ref()
            .and_then(|p| p.account.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SessionResult<Value> {
        let token = self.lifecycle.token().ok_or(SessionError::NotSignedIn)?;
        self.transport
            .request(method, path, &bearer_headers(&token), body)
            .await
            .map_err(|err| self.route_failure(err))
    }

    fn route_failure(&self, err: TransportError) -> SessionError {
        if err.is_connectivity() {
            warn!(error = %err, "platform unreachable, starting reconnection");
            self.reconnect.trigger_reconnect();
        }
        SessionError::from(err)
    }
}

/// Builder for [`SessionFacade`]
///
/// Anything left unset uses the production implementation.
pub struct SessionFacadeBuilder {
    config: SessionConfig,
    credentials: Credentials,
    application: ApplicationIdentity,
    transport: Arc<dyn Transport>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<dyn TimerScheduler>>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    probe: Option<Arc<dyn HealthProbe>>,
    renewer: Option<Arc<dyn TokenRenewer>>,
    sink: Option<Arc<dyn NotificationSink>>,
    event_capacity: usize,
}

impl SessionFacadeBuilder {
    /// Wall clock for token timing
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Scheduler for renewal and probe timers
    pub fn scheduler(mut self, scheduler: Arc<dyn TimerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Token claims decoder
    pub fn decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Reachability check run by reconnection
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Token renewal call
    pub fn renewer(mut self, renewer: Arc<dyn TokenRenewer>) -> Self {
        self.renewer = Some(renewer);
        self
    }

    /// Also deliver every event to `sink`
    ///
    /// [`SessionFacade::subscribe`] keeps working; the built-in bus is
    /// notified first.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Events buffered per subscriber
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the config and assemble the facade
    pub fn build(self) -> SessionResult<SessionFacade> {
        self.config.validate()?;

        let transport = self.transport;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler::new()));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(JwtClaimsDecoder));
        let renewer = self
            .renewer
            .unwrap_or_else(|| Arc::new(TransportRenewer::new(Arc::clone(&transport))));
        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(PortalHealthProbe::new(
                Arc::clone(&transport),
                self.config.is_official(),
                self.config.reconnect.settle_delay(),
            ))
        });
        let events = Arc::new(EventBus::new(self.event_capacity));
        let sink: Arc<dyn NotificationSink> = match self.sink {
            Some(extra) => {
                let bus: Arc<dyn NotificationSink> = events.clone();
                Arc::new(FanOut::new(vec![bus, extra]))
            }
            None => events.clone(),
        };

        let lifecycle = TokenLifecycleManager::new(
            self.config.token.clone(),
            clock,
            Arc::clone(&scheduler),
            decoder,
            renewer,
            Arc::clone(&sink),
        );
        let reconnect = ReconnectionController::new(
            self.config.reconnect.to_backoff_config(),
            probe,
            scheduler,
            sink,
        );

        Ok(SessionFacade {
            credentials: self.credentials,
            application: self.application,
            transport,
            events,
            lifecycle,
            reconnect,
            aggregator: PaginatedAggregator::from_config(&self.config.pagination),
            profile: Mutex::new(None),
        })
    }
}
