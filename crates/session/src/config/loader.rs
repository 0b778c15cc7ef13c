//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Environment variables, when `RAINBOW_HOST` is set
//! 2. Otherwise a JSON or TOML file found by [`probe_config_paths`]
//!
//! ## Environment Variables
//! - `RAINBOW_HOST`: platform host (required for environment loading)
//! - `RAINBOW_OFFICIAL`: force the official-deployment probe set (true/false)
//! - `RAINBOW_RECONNECT_INITIAL_DELAY_MS`: first reconnection delay
//! - `RAINBOW_RECONNECT_MAX_DELAY_MS`: reconnection delay cap
//! - `RAINBOW_RECONNECT_RANDOMIZATION`: jitter factor in `[0, 1]`
//! - `RAINBOW_RECONNECT_MAX_ATTEMPTS`: failures before giving up
//! - `RAINBOW_PAGE_SIZE`: page size for collection fetches
//! - `RAINBOW_HTTP_TIMEOUT_SECS`: HTTP request timeout
//!
//! ## File Locations
//! `rainbow.json` then `rainbow.toml`, in the working directory and then next
//! to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rainbow_common::{CommonError, CommonResult};

use super::SessionConfig;

/// Load configuration with automatic fallback strategy
///
/// The result is validated before it is returned.
pub fn load() -> CommonResult<SessionConfig> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `RAINBOW_HOST` is required; every other variable overrides its default
/// only when present.
pub fn load_from_env() -> CommonResult<SessionConfig> {
    let host = std::env::var("RAINBOW_HOST").map_err(|_| {
        CommonError::config("Missing required environment variable: RAINBOW_HOST")
    })?;

    let mut config = SessionConfig::for_host(host);
    config.official_deployment = env_bool("RAINBOW_OFFICIAL");

    if let Some(value) = env_parse("RAINBOW_RECONNECT_INITIAL_DELAY_MS")? {
        config.reconnect.initial_delay_ms = value;
    }
    if let Some(value) = env_parse("RAINBOW_RECONNECT_MAX_DELAY_MS")? {
        config.reconnect.max_delay_ms = value;
    }
    if let Some(value) = env_parse("RAINBOW_RECONNECT_RANDOMIZATION")? {
        config.reconnect.randomization_factor = value;
    }
    if let Some(value) = env_parse("RAINBOW_RECONNECT_MAX_ATTEMPTS")? {
        config.reconnect.max_attempts = value;
    }
    if let Some(value) = env_parse("RAINBOW_PAGE_SIZE")? {
        config.pagination.page_size = value;
    }
    if let Some(value) = env_parse("RAINBOW_HTTP_TIMEOUT_SECS")? {
        config.http.timeout_secs = value;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. The format is
/// detected by extension (`.json` or `.toml`).
pub fn load_from_file(path: Option<PathBuf>) -> CommonResult<SessionConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CommonError::config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CommonError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CommonError::config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> CommonResult<SessionConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => Ok(toml::from_str(contents)?),
        "json" => Ok(serde_json::from_str(contents)?),
        _ => Err(CommonError::config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first file that exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("rainbow.json"));
        candidates.push(cwd.join("rainbow.toml"));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.join("rainbow.json"));
            candidates.push(exe_dir.join("rainbow.toml"));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_parse<T>(key: &str) -> CommonResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            CommonError::validation_with_value(key, e.to_string(), raw.clone())
        }),
        Err(_) => Ok(None),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
