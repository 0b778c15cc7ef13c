//! Abstract request interface consumed by the session layer
//!
//! Everything above this module talks HTTP only through [`Transport`]. The
//! crate ships [`http::HttpTransport`] on top of `reqwest`; tests plug in
//! scripted implementations.

pub mod http;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::{HttpTransport, HttpTransportBuilder};

/// Request headers, keyed by header name
pub type Headers = BTreeMap<String, String>;

/// HTTP verbs the session layer issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Upper-case verb
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category of a transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Host unreachable, connection refused or reset
    Connect,
    /// No answer within the configured timeout
    Timeout,
    /// The server answered with a non-success status
    Status,
    /// The response body could not be read or parsed
    Decode,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Error returned by a [`Transport`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failure on {path}: {message}")]
pub struct TransportError {
    /// Failure category
    pub kind: TransportErrorKind,
    /// HTTP status, for `Status` failures
    pub status: Option<u16>,
    /// Request path
    pub path: String,
    /// Detail from the server or client
    pub message: String,
}

impl TransportError {
    /// Host unreachable
    pub fn connect(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, None, path, message)
    }

    /// No answer in time
    pub fn timeout(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, None, path, message)
    }

    /// Non-success status
    pub fn status(path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status, Some(status), path, message)
    }

    /// Unreadable body
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, None, path, message)
    }

    fn new(
        kind: TransportErrorKind,
        status: Option<u16>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { kind, status, path: path.into(), message: message.into() }
    }

    /// Whether the failure means the platform is unreachable
    ///
    /// Connect and timeout failures qualify, as do gateway statuses
    /// (502, 503, 504) emitted by the load balancer while the platform is
    /// down.
    pub fn is_connectivity(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Connect | TransportErrorKind::Timeout)
            || matches!(self.status, Some(502..=504))
    }

    /// Whether the server rejected the caller's credentials
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

/// Request interface onto the platform's REST API
///
/// Implementors provide [`request`](Self::request); the verb helpers forward
/// to it. A successful call yields the JSON body, or `Value::Null` when the
/// body is empty.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;

    async fn get(&self, path: &str, headers: &Headers) -> Result<Value, TransportError> {
        self.request(Method::Get, path, headers, None).await
    }

    async fn post(
        &self,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.request(Method::Post, path, headers, body).await
    }

    async fn put(
        &self,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.request(Method::Put, path, headers, body).await
    }

    async fn delete(&self, path: &str, headers: &Headers) -> Result<Value, TransportError> {
        self.request(Method::Delete, path, headers, None).await
    }
}
