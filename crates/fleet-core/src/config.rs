//! Process-wide tunables, loaded once from the environment at startup.
//!
//! No config-file format is invented here — every field is read from an
//! environment variable with a sane default.

use std::env;
use std::time::Duration;

/// Global configuration for the session manager, lifecycle handshake,
/// crypto, and replay subsystems. Constructed once; there is no reload
/// path — the master passphrase in particular is read a single time at
/// process start and never re-read from the environment afterward.
#[derive(Debug, Clone)]
pub struct Config {
    /// Passphrase the `CredentialCipher` derives its key from.
    pub master_passphrase: String,
    pub auth_timeout: Duration,
    pub replay_window_secs: f64,
    pub replay_future_skew_secs: f64,
    pub rate_limiter_max_failures: u32,
    pub rate_limiter_window: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    /// Load configuration from the process environment. `FLEET_MASTER_PASSPHRASE`
    /// is the only required variable; everything else falls back to the
    /// defaults named throughout the session/lifecycle/crypto/replay modules.
    pub fn from_env() -> Result<Self, ConfigError> {
        let master_passphrase = env::var("FLEET_MASTER_PASSPHRASE")
            .map_err(|_| ConfigError::Missing("FLEET_MASTER_PASSPHRASE"))?;

        Ok(Self {
            master_passphrase,
            auth_timeout: Duration::from_secs(parse_env_u64("FLEET_AUTH_TIMEOUT_SECS", 30)?),
            replay_window_secs: parse_env_f64("FLEET_REPLAY_WINDOW_SECS", 300.0)?,
            replay_future_skew_secs: parse_env_f64("FLEET_REPLAY_SKEW_SECS", 30.0)?,
            rate_limiter_max_failures: parse_env_u64("FLEET_RATE_LIMIT_MAX_FAILURES", 5)? as u32,
            rate_limiter_window: Duration::from_secs(parse_env_u64("FLEET_RATE_LIMIT_WINDOW_SECS", 60)?),
            request_timeout: Duration::from_secs(parse_env_u64("FLEET_REQUEST_TIMEOUT_SECS", 120)?),
        })
    }
}

fn parse_env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_env_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}
