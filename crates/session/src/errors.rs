use std::time::Duration;

use rainbow_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::auth::TokenFormatError;
use crate::pagination::AggregationInconsistency;
use crate::transport::TransportError;

/// Result alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform rejected the credentials (401 / 403)
    #[error("Authentication rejected with status {status}: {message}")]
    Authentication { status: u16, message: String },

    /// A token's claims could not be read
    #[error(transparent)]
    TokenFormat(#[from] TokenFormatError),

    /// The platform could not be reached; a reconnection cycle was started
    #[error("Network unreachable: {0}")]
    Network(#[source] TransportError),

    /// Renewal failed and the token was dropped
    #[error("Session token expired: {reason}")]
    TokenExpired { reason: String },

    /// A collection fetch hit its page ceiling
    #[error(transparent)]
    Aggregation(#[from] AggregationInconsistency),

    /// Every probe of the reconnection cycle failed
    #[error("Reconnection abandoned after {attempts} consecutive failures")]
    PermanentReconnectFailure { attempts: u32 },

    /// Any other failed request
    #[error("Request failed: {0}")]
    Transport(#[source] TransportError),

    /// The operation needs a session token
    #[error("Not signed in")]
    NotSignedIn,

    /// Invalid settings
    #[error(transparent)]
    Config(#[from] CommonError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        if err.is_connectivity() {
            Self::Network(err)
        } else {
            Self::Transport(err)
        }
    }
}

impl ErrorClassification for SessionError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(_) | Self::TokenExpired { .. } => ErrorSeverity::Warning,
            Self::NotSignedIn => ErrorSeverity::Info,
            Self::PermanentReconnectFailure { .. } => ErrorSeverity::Critical,
            Self::Authentication { .. }
            | Self::TokenFormat(_)
            | Self::Aggregation(_)
            | Self::Transport(_) => ErrorSeverity::Error,
            Self::Config(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::PermanentReconnectFailure { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        let network = SessionError::from(TransportError::connect("/api/rainbow/ping", "refused"));
        assert!(matches!(network, SessionError::Network(_)));
        assert!(network.is_retryable());

        let transport = SessionError::from(TransportError::status("/x", 404, "missing"));
        assert!(matches!(transport, SessionError::Transport(_)));
        assert!(!transport.is_retryable());

        assert!(!SessionError::NotSignedIn.is_retryable());
        assert!(!SessionError::TokenExpired { reason: "renew failed".into() }.is_retryable());
        assert!(!SessionError::Authentication { status: 401, message: "bad".into() }.is_retryable());
    }

    #[test]
    fn permanent_failure_is_critical() {
        let err = SessionError::PermanentReconnectFailure { attempts: 50 };
        assert!(err.is_critical());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.to_string(), "Reconnection abandoned after 50 consecutive failures");
    }

    #[test]
    fn config_errors_keep_their_severity() {
        let err = SessionError::from(CommonError::config_field("host", "must not be empty"));
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert!(err.to_string().contains("host"));
    }
}
