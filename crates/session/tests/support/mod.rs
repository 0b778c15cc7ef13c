//! Shared test helpers for `rainbow-session` integration tests.
//!
//! Provides a scripted transport, a scripted health probe and a JWT builder so
//! the tests can focus on session behaviour instead of wiring.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rainbow_common::testing::{ManualScheduler, MockClock};
use rainbow_session::auth::{ApplicationIdentity, Credentials};
use rainbow_session::reconnect::{HealthProbe, PING_PATH};
use rainbow_session::transport::{Headers, Method, Transport, TransportError};
use rainbow_session::{SessionConfig, SessionFacade};
use serde_json::Value;

/// Unsigned JWT carrying the given claims
pub fn jwt(iat: i64, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(format!(r#"{{"iat":{iat},"exp":{exp},"id":"u-1"}}"#));
    format!("{header}.{body}.signature")
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

/// Transport answering from per-path response queues
///
/// The last response queued for a path is repeated once the queue drains.
/// Paths without any response answer 404.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, response: Result<Value, TransportError>) {
        self.responses.lock().entry(path.to_string()).or_default().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.path.clone()).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.calls.lock().push(RecordedCall {
            method,
            path: path.to_string(),
            headers: headers.clone(),
            body: body.cloned(),
        });

        let mut responses = self.responses.lock();
        match responses.get_mut(path) {
            Some(queue) if queue.len() > 1 => {
                queue.pop_front().unwrap_or_else(|| Err(TransportError::status(path, 500, "empty")))
            }
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::status(path, 500, "empty"))),
            None => Err(TransportError::status(path, 404, "no response scripted")),
        }
    }
}

/// Health probe answering from a script; unscripted checks fail
#[derive(Default)]
pub struct ScriptedProbe {
    results: Mutex<VecDeque<bool>>,
    calls: Mutex<u32>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, results: &[bool]) {
        self.results.lock().extend(results.iter().copied());
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> Result<(), TransportError> {
        *self.calls.lock() += 1;
        if self.results.lock().pop_front().unwrap_or(false) {
            Ok(())
        } else {
            Err(TransportError::connect(PING_PATH, "connection refused"))
        }
    }
}

/// Facade wired to mocks and virtual time
pub struct TestSession {
    pub facade: SessionFacade,
    pub transport: Arc<MockTransport>,
    pub probe: Arc<ScriptedProbe>,
    pub scheduler: Arc<ManualScheduler>,
    pub clock: MockClock,
}

pub fn test_session(now_ms: u64, mut config: SessionConfig) -> TestSession {
    config.reconnect.randomization_factor = 0.0;
    let clock = MockClock::at_unix_millis(now_ms);
    let scheduler = Arc::new(ManualScheduler::with_clock(clock.clone()));
    let transport = MockTransport::new();
    let probe = ScriptedProbe::new();

    let facade = SessionFacade::builder(
        config,
        Credentials::new("alice@example.com", "Passw0rd!"),
        ApplicationIdentity::new("app-id-7", "app-secret"),
        transport.clone(),
    )
    .clock(Arc::new(clock.clone()))
    .scheduler(scheduler.clone())
    .probe(probe.clone())
    .event_capacity(512)
    .build()
    .expect("test facade");

    TestSession { facade, transport, probe, scheduler, clock }
}

/// Body of a successful login
pub fn login_body(token: &str) -> Value {
    serde_json::json!({
        "token": token,
        "loggedInUser": {"id": "u-1", "loginEmail": "alice@example.com", "companyId": "c-9"},
        "loggedInApplication": {"id": "app-id-7", "name": "demo"}
    })
}
