//! Resilience and cache configuration.
//!
//! Every policy is optional: a `None` field disables it. Values can be built
//! in code, deserialized from JSON, or overlaid from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `TICKWIRE_TIMEOUT_MS` | Per-attempt timeout, `0` disables |
//! | `TICKWIRE_RETRY_MAX_ATTEMPTS` | Total attempts, `0` or `1` disables retry |
//! | `TICKWIRE_RETRY_BASE_MS` | First backoff delay |
//! | `TICKWIRE_RETRY_MAX_MS` | Backoff cap |
//! | `TICKWIRE_BREAKER_FAILURE_RATE` | Enables the breaker with this threshold |
//! | `TICKWIRE_BREAKER_MIN_REQUESTS` | Outcomes needed before evaluating |
//! | `TICKWIRE_BREAKER_WINDOW_MS` | Rolling window |
//! | `TICKWIRE_BREAKER_OPEN_MS` | Open cool-down |
//! | `TICKWIRE_BREAKER_HALF_OPEN_SUCCESSES` | Successes needed to close |
//! | `TICKWIRE_RATE_LIMIT` | Enables the limiter with this many calls per period |
//! | `TICKWIRE_RATE_PERIOD_MS` | Limiter period |
//! | `TICKWIRE_REQUEST_CACHE_TTL_MS` | Request-dedup cache TTL |
//! | `TICKWIRE_FETCH_CACHE_TTL_MS` | Fetch-result cache TTL |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::retry::{Backoff, RetryConfig};
use crate::throttling::RateLimitConfig;

/// Policy set applied by [`crate::ResilientClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            retry: Some(RetryConfig::default()),
            circuit_breaker: None,
            rate_limit: None,
        }
    }
}

impl ResilienceConfig {
    /// No policies at all: one attempt, no timeout.
    pub fn disabled() -> Self {
        Self {
            timeout: None,
            retry: None,
            circuit_breaker: None,
            rate_limit: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Defaults overlaid with `TICKWIRE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "TICKWIRE_TIMEOUT_MS")? {
            config.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        let attempts = parse_var::<u32, _>(&lookup, "TICKWIRE_RETRY_MAX_ATTEMPTS")?;
        let base = parse_var::<u64, _>(&lookup, "TICKWIRE_RETRY_BASE_MS")?;
        let max = parse_var::<u64, _>(&lookup, "TICKWIRE_RETRY_MAX_MS")?;
        if attempts.is_some() || base.is_some() || max.is_some() {
            let mut retry = config.retry.unwrap_or_default();
            if let Some(attempts) = attempts {
                retry.max_attempts = attempts;
            }
            if let Backoff::Exponential {
                base: current_base,
                factor,
                max: current_max,
                jitter,
            } = retry.backoff
            {
                retry.backoff = Backoff::Exponential {
                    base: base.map(Duration::from_millis).unwrap_or(current_base),
                    factor,
                    max: max.map(Duration::from_millis).unwrap_or(current_max),
                    jitter,
                };
            }
            config.retry = (retry.max_attempts > 1).then_some(retry);
        }

        if let Some(rate) = parse_var::<f64, _>(&lookup, "TICKWIRE_BREAKER_FAILURE_RATE")? {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(
                    "TICKWIRE_BREAKER_FAILURE_RATE",
                    rate.to_string(),
                    "must be between 0.0 and 1.0",
                ));
            }
            let mut breaker = CircuitBreakerConfig {
                failure_rate_threshold: rate,
                ..CircuitBreakerConfig::default()
            };
            if let Some(min) = parse_var(&lookup, "TICKWIRE_BREAKER_MIN_REQUESTS")? {
                breaker.minimum_requests = min;
            }
            if let Some(ms) = parse_var(&lookup, "TICKWIRE_BREAKER_WINDOW_MS")? {
                breaker.window = Duration::from_millis(ms);
            }
            if let Some(ms) = parse_var(&lookup, "TICKWIRE_BREAKER_OPEN_MS")? {
                breaker.open_duration = Duration::from_millis(ms);
            }
            if let Some(successes) = parse_var(&lookup, "TICKWIRE_BREAKER_HALF_OPEN_SUCCESSES")? {
                breaker.half_open_successes = successes;
            }
            config.circuit_breaker = Some(breaker);
        }

        if let Some(capacity) = parse_var::<u32, _>(&lookup, "TICKWIRE_RATE_LIMIT")? {
            let mut limit = RateLimitConfig {
                capacity,
                ..RateLimitConfig::default()
            };
            if let Some(ms) = parse_var(&lookup, "TICKWIRE_RATE_PERIOD_MS")? {
                limit.period = Duration::from_millis(ms);
            }
            config.rate_limit = (capacity > 0).then_some(limit);
        }

        Ok(config)
    }
}

/// TTLs for the two cache layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub request_ttl: Duration,
    pub fetch_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(30),
            fetch_ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, "TICKWIRE_REQUEST_CACHE_TTL_MS")? {
            config.request_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "TICKWIRE_FETCH_CACHE_TTL_MS")? {
            config.fetch_ttl = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|error| invalid(name, raw.clone(), error.to_string()))
}

fn invalid(name: &str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_owned(),
        value,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_enable_timeout_and_retry_only() {
        let config = ResilienceConfig::from_lookup(lookup(&[])).expect("defaults are valid");

        assert_eq!(config, ResilienceConfig::default());
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert!(config.retry.is_some());
        assert!(config.circuit_breaker.is_none());
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn zero_values_disable_policies() {
        let config = ResilienceConfig::from_lookup(lookup(&[
            ("TICKWIRE_TIMEOUT_MS", "0"),
            ("TICKWIRE_RETRY_MAX_ATTEMPTS", "1"),
            ("TICKWIRE_RATE_LIMIT", "0"),
        ]))
        .expect("valid");

        assert_eq!(config.timeout, None);
        assert_eq!(config.retry, None);
        assert_eq!(config.rate_limit, None);
    }

    #[test]
    fn breaker_and_limiter_are_enabled_by_their_variables() {
        let config = ResilienceConfig::from_lookup(lookup(&[
            ("TICKWIRE_BREAKER_FAILURE_RATE", "0.25"),
            ("TICKWIRE_BREAKER_OPEN_MS", "1500"),
            ("TICKWIRE_RATE_LIMIT", "5"),
            ("TICKWIRE_RATE_PERIOD_MS", "60000"),
            ("TICKWIRE_RETRY_BASE_MS", "50"),
        ]))
        .expect("valid");

        let breaker = config.circuit_breaker.expect("breaker enabled");
        assert_eq!(breaker.failure_rate_threshold, 0.25);
        assert_eq!(breaker.open_duration, Duration::from_millis(1500));

        let limit = config.rate_limit.expect("limiter enabled");
        assert_eq!(limit.capacity, 5);
        assert_eq!(limit.period, Duration::from_secs(60));

        match config.retry.expect("retry kept").backoff {
            Backoff::Exponential { base, .. } => assert_eq!(base, Duration::from_millis(50)),
            other => panic!("unexpected backoff {other:?}"),
        }
    }

    #[test]
    fn unparseable_values_are_reported_by_name() {
        let error = ResilienceConfig::from_lookup(lookup(&[("TICKWIRE_TIMEOUT_MS", "soon")]))
            .expect_err("must fail");

        let ConfigError::Invalid { name, value, .. } = error;
        assert_eq!(name, "TICKWIRE_TIMEOUT_MS");
        assert_eq!(value, "soon");
    }

    #[test]
    fn failure_rate_outside_unit_interval_is_rejected() {
        let result =
            ResilienceConfig::from_lookup(lookup(&[("TICKWIRE_BREAKER_FAILURE_RATE", "1.5")]));
        assert!(result.is_err());
    }

    #[test]
    fn missing_json_fields_fall_back_to_defaults() {
        let config: ResilienceConfig =
            serde_json::from_str(r#"{"timeout": null}"#).expect("valid json");

        assert_eq!(config.timeout, None);
        assert_eq!(config.retry, Some(RetryConfig::default()));
    }

    #[test]
    fn cache_ttls_are_read_from_lookup() {
        let config = CacheConfig::from_lookup(lookup(&[("TICKWIRE_FETCH_CACHE_TTL_MS", "1000")]))
            .expect("valid");

        assert_eq!(config.fetch_ttl, Duration::from_secs(1));
        assert_eq!(config.request_ttl, CacheConfig::default().request_ttl);
    }
}
