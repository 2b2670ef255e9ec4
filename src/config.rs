//! Environment-driven configuration. `.env` is loaded by `main` before this
//! runs, so values there behave like real environment variables.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::bus::DEFAULT_CAPACITY;
use crate::latency::RandomizedLatency;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub latency: RandomizedLatency,
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            latency: RandomizedLatency::default(),
            event_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_address = parse(&lookup, "UNIMIND_BIND_ADDR")?.unwrap_or(defaults.bind_address);
        let matching = millis(&lookup, "UNIMIND_MATCH_DELAY_MS")?.unwrap_or(defaults.latency.matching);
        let reply_min =
            millis(&lookup, "UNIMIND_REPLY_DELAY_MIN_MS")?.unwrap_or(defaults.latency.reply_min);
        let reply_jitter = millis(&lookup, "UNIMIND_REPLY_DELAY_JITTER_MS")?
            .unwrap_or(defaults.latency.reply_jitter);
        let auth = millis(&lookup, "UNIMIND_AUTH_DELAY_MS")?.unwrap_or(defaults.latency.auth);
        let register =
            millis(&lookup, "UNIMIND_REGISTER_DELAY_MS")?.unwrap_or(defaults.latency.register);
        let event_capacity: usize =
            parse(&lookup, "UNIMIND_EVENT_CAPACITY")?.unwrap_or(defaults.event_capacity);

        if event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "UNIMIND_EVENT_CAPACITY",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            bind_address,
            latency: RandomizedLatency {
                matching,
                reply_min,
                reply_jitter,
                auth,
                register,
            },
            event_capacity,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, F>(lookup, key)?.map(Duration::from_millis))
}
