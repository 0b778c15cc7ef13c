//! # Rainbow Session
//!
//! Session resilience layer of the Rainbow SDK.
//!
//! This crate contains:
//! - Credential encoding and the login / bearer header sets
//! - Token lifecycle tracking with proactive renewal
//! - Connection-loss recovery driven by a Fibonacci backoff
//! - The "fetch until complete" pagination loop
//! - [`SessionFacade`], which composes all of the above
//!
//! ## Architecture
//! - Depends on `rainbow-common` for backoff, clocks and timers
//! - HTTP only through the [`transport::Transport`] trait; a `reqwest`
//!   adapter is provided in [`transport::http`]
//! - Events go through [`events::NotificationSink`], never a global emitter

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod pagination;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-export commonly used items
pub use auth::{ApplicationIdentity, Credentials, TokenState};
pub use config::SessionConfig;
pub use errors::{SessionError, SessionResult};
pub use events::{EventBus, FanOut, NotificationSink, SessionEvent};
pub use pagination::{AggregationInconsistency, PageCursor, PageResult, PaginatedAggregator};
pub use reconnect::{ReconnectOutcome, ReconnectState, ReconnectionController};
pub use session::{Session, SessionFacade, SessionFacadeBuilder, SignInResponse};
pub use transport::{HttpTransport, Transport, TransportError};
