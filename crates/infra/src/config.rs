//! Engine settings read from the environment.

use std::time::Duration;

use thiserror::Error;

use gasflow_observability::LogFormat;

use crate::outbox::{OutboxWorkerConfig, RetryPolicy};

pub const OUTBOX_MAX_ATTEMPTS: &str = "GASFLOW_OUTBOX_MAX_ATTEMPTS";
pub const OUTBOX_BASE_DELAY_MS: &str = "GASFLOW_OUTBOX_BASE_DELAY_MS";
pub const OUTBOX_MAX_DELAY_MS: &str = "GASFLOW_OUTBOX_MAX_DELAY_MS";
pub const OUTBOX_POLL_INTERVAL_MS: &str = "GASFLOW_OUTBOX_POLL_INTERVAL_MS";
pub const LOG_FORMAT: &str = "GASFLOW_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub outbox_max_attempts: u32,
    pub outbox_base_delay: Duration,
    pub outbox_max_delay: Duration,
    pub outbox_poll_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            outbox_max_attempts: 5,
            outbox_base_delay: Duration::from_millis(500),
            outbox_max_delay: Duration::from_secs(60),
            outbox_poll_interval: Duration::from_millis(100),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let outbox_max_attempts = match lookup(OUTBOX_MAX_ATTEMPTS) {
            Some(v) => match v.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(invalid(OUTBOX_MAX_ATTEMPTS, v, "an integer >= 1")),
            },
            None => defaults.outbox_max_attempts,
        };
        let outbox_base_delay = millis(&lookup, OUTBOX_BASE_DELAY_MS)?.unwrap_or(defaults.outbox_base_delay);
        let outbox_max_delay = millis(&lookup, OUTBOX_MAX_DELAY_MS)?.unwrap_or(defaults.outbox_max_delay);
        let outbox_poll_interval =
            millis(&lookup, OUTBOX_POLL_INTERVAL_MS)?.unwrap_or(defaults.outbox_poll_interval);
        let log_format = match lookup(LOG_FORMAT) {
            Some(v) => v.parse().map_err(|_| invalid(LOG_FORMAT, v, "json or pretty"))?,
            None => defaults.log_format,
        };

        if outbox_max_delay < outbox_base_delay {
            return Err(invalid(
                OUTBOX_MAX_DELAY_MS,
                outbox_max_delay.as_millis().to_string(),
                "a value >= the base delay",
            ));
        }

        Ok(Self {
            outbox_max_attempts,
            outbox_base_delay,
            outbox_max_delay,
            outbox_poll_interval,
            log_format,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.outbox_max_attempts, self.outbox_base_delay, self.outbox_max_delay)
    }

    pub fn worker_config(&self) -> OutboxWorkerConfig {
        OutboxWorkerConfig::default().with_poll_interval(self.outbox_poll_interval)
    }
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value, expected }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match lookup(var) {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| invalid(var, v, "milliseconds")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            (OUTBOX_MAX_ATTEMPTS, "3"),
            (OUTBOX_BASE_DELAY_MS, "10"),
            (OUTBOX_MAX_DELAY_MS, "80"),
            (OUTBOX_POLL_INTERVAL_MS, "25"),
            (LOG_FORMAT, "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.outbox_max_attempts, 3);
        assert_eq!(config.outbox_base_delay, Duration::from_millis(10));
        assert_eq!(config.outbox_max_delay, Duration::from_millis(80));
        assert_eq!(config.worker_config().poll_interval, Duration::from_millis(25));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_bad_values() {
        let err = EngineConfig::from_lookup(lookup(&[(OUTBOX_MAX_ATTEMPTS, "0")])).unwrap_err();
        assert!(err.to_string().contains(OUTBOX_MAX_ATTEMPTS));

        assert!(EngineConfig::from_lookup(lookup(&[(OUTBOX_BASE_DELAY_MS, "soon")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(LOG_FORMAT, "xml")])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup(&[(OUTBOX_BASE_DELAY_MS, "900"), (OUTBOX_MAX_DELAY_MS, "100")]))
                .is_err()
        );
    }
}
