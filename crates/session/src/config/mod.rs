//! Session configuration
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it changes. See [`loader`] for environment and file loading.

pub mod loader;

use std::time::Duration;

use rainbow_common::resilience::{
    BackoffConfig, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_RANDOMIZATION_FACTOR,
};
use rainbow_common::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

/// Production platform host
pub const OFFICIAL_HOST: &str = "openrainbow.com";

/// Top-level configuration of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Platform host, e.g. `openrainbow.com` or `sandbox.openrainbow.com`
    pub host: String,
    /// Whether every sub-service is probed during reconnection; derived
    /// from `host` when unset
    pub official_deployment: Option<bool>,
    /// Reconnection backoff
    pub reconnect: ReconnectConfig,
    /// Token renewal
    pub token: TokenConfig,
    /// Collection fetches
    pub pagination: PaginationConfig,
    /// HTTP adapter
    pub http: HttpConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: OFFICIAL_HOST.to_string(),
            official_deployment: None,
            reconnect: ReconnectConfig::default(),
            token: TokenConfig::default(),
            pagination: PaginationConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Configuration targeting `host` with defaults elsewhere
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Self::default() }
    }

    /// Whether this is the production deployment
    pub fn is_official(&self) -> bool {
        self.official_deployment.unwrap_or_else(|| host_name(&self.host) == OFFICIAL_HOST)
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> String {
        if let Some(base_url) = &self.http.base_url {
            return base_url.clone();
        }
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        }
    }

    /// Reject values that would make the session misbehave
    pub fn validate(&self) -> CommonResult<()> {
        if self.host.trim().is_empty() {
            return Err(CommonError::config_field("host", "must not be empty"));
        }
        self.reconnect.to_backoff_config().validate().map_err(|err| match err {
            CommonError::Config { message, field: Some(field) } => {
                CommonError::config_field(format!("reconnect.{field}"), message)
            }
            other => other,
        })?;
        if self.token.renewal_lead_secs == 0 {
            return Err(CommonError::config_field("token.renewal_lead_secs", "must be greater than 0"));
        }
        if self.pagination.page_size == 0 {
            return Err(CommonError::config_field("pagination.page_size", "must be greater than 0"));
        }
        if self.pagination.max_pages == 0 {
            return Err(CommonError::config_field("pagination.max_pages", "must be greater than 0"));
        }
        if self.http.timeout_secs == 0 {
            return Err(CommonError::config_field("http.timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

fn host_name(host: &str) -> &str {
    let host = host.trim_start_matches("https://").trim_start_matches("http://");
    host.split(['/', ':']).next().unwrap_or(host)
}

/// Reconnection backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// First probe delay
    pub initial_delay_ms: u64,
    /// Cap on any probe delay
    pub max_delay_ms: u64,
    /// Multiplicative jitter applied to each delay
    pub randomization_factor: f64,
    /// Consecutive failed probes before giving up
    pub max_attempts: u32,
    /// Pause between a successful ping and the sub-service probes
    pub settle_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            settle_delay_ms: 10_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff settings for the reconnection controller
    pub fn to_backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            randomization_factor: self.randomization_factor,
            max_attempts: self.max_attempts,
        }
    }

    /// `settle_delay_ms` as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Instant the renewal thresholds are measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenewalAnchor {
    /// The token's `exp` claim
    #[default]
    Expiry,
    /// Midway between `iat` and `exp`
    HalfLife,
}

/// Token renewal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Instant the thresholds below are measured against
    pub anchor: RenewalAnchor,
    /// Renew inline when the anchor is closer than this
    pub immediate_threshold_secs: u64,
    /// Otherwise fire the renewal timer this long before the anchor
    pub renewal_lead_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { anchor: RenewalAnchor::Expiry, immediate_threshold_secs: 300, renewal_lead_secs: 3_600 }
    }
}

/// Collection fetch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Items requested per page
    pub page_size: usize,
    /// Pages fetched before the total is deemed inconsistent
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: 100, max_pages: 1_000 }
    }
}

/// HTTP adapter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// `User-Agent` header value
    pub user_agent: Option<String>,
    /// Overrides the URL derived from `host`
    pub base_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30, user_agent: None, base_url: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().expect("default config is valid");
        assert!(config.is_official());
        assert_eq!(config.base_url(), "https://openrainbow.com");
        assert_eq!(config.reconnect.to_backoff_config(), BackoffConfig::default());
    }

    #[test]
    fn official_flag_derived_from_host() {
        assert!(!SessionConfig::for_host("sandbox.openrainbow.com").is_official());
        assert!(SessionConfig::for_host("https://openrainbow.com:443").is_official());

        let mut forced = SessionConfig::for_host("sandbox.openrainbow.com");
        forced.official_deployment = Some(true);
        assert!(forced.is_official());
    }

    #[test]
    fn base_url_override_wins() {
        let mut config = SessionConfig::for_host("openrainbow.com");
        config.http.base_url = Some("http://127.0.0.1:8080".into());
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert_eq!(SessionConfig::for_host("http://localhost:3000").base_url(), "http://localhost:3000");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SessionConfig::default();
        config.reconnect.initial_delay_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reconnect.initial_delay"));

        let mut config = SessionConfig::default();
        config.reconnect.initial_delay_ms = 90_000;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.reconnect.randomization_factor = 1.2;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.pagination.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.pagination.max_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"host": "sandbox.openrainbow.com", "token": {"anchor": "half-life"}}"#)
                .expect("valid json");
        assert_eq!(config.token.anchor, RenewalAnchor::HalfLife);
        assert_eq!(config.token.renewal_lead_secs, 3_600);
        assert_eq!(config.pagination.page_size, 100);
    }
}
