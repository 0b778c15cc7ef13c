//! Platform health checks run by reconnection cycles

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::auth::default_headers;
use crate::transport::{Transport, TransportError};

/// Reachability endpoint queried first by every probe
pub const PING_PATH: &str = "/api/rainbow/ping";

/// Sub-services whose `about` endpoint must answer on an official deployment
pub const ABOUT_SERVICES: [&str; 6] =
    ["authentication", "enduser", "telephony", "admin", "channels", "applications"];

/// `about` endpoint of a sub-service
pub fn about_path(service: &str) -> String {
    format!("/api/rainbow/{service}/v1.0/about")
}

/// Decides whether the platform is reachable again
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), TransportError>;
}

/// Probe against the platform's own health endpoints
///
/// Pings the portal, then on an official deployment waits `settle_delay` and
/// queries every sub-service `about` endpoint concurrently. Any failure fails
/// the whole probe.
pub struct PortalHealthProbe {
    transport: Arc<dyn Transport>,
    official: bool,
    settle_delay: Duration,
}

impl PortalHealthProbe {
    /// Probe through `transport`; `official` adds the sub-service checks
    pub fn new(transport: Arc<dyn Transport>, official: bool, settle_delay: Duration) -> Self {
        Self { transport, official, settle_delay }
    }
}

#[async_trait]
impl HealthProbe for PortalHealthProbe {
    async fn check(&self) -> Result<(), TransportError> {
        let headers = default_headers();
        self.transport.get(PING_PATH, &headers).await?;
        debug!("portal ping answered");

        if !self.official {
            return Ok(());
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let paths: Vec<String> = ABOUT_SERVICES.iter().map(|svc| about_path(svc)).collect();
        try_join_all(paths.iter().map(|path| self.transport.get(path, &headers))).await?;
        debug!(services = ABOUT_SERVICES.len(), "all sub-services answered");
        Ok(())
    }
}
