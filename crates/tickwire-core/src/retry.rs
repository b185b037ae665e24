//! Retry logic with exponential backoff and jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ retry)`, capped at `max`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    ///
    /// With jitter the result never exceeds `max`.
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(i32::try_from(retry).unwrap_or(i32::MAX));
                let seconds = base.as_secs_f64() * scale;
                let capped_seconds = seconds.min(max.as_secs_f64());
                let capped = Duration::try_from_secs_f64(capped_seconds.max(0.0)).unwrap_or(max);

                if !jitter {
                    return capped;
                }

                let capped_ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
                let jitter_ms = capped_ms / 2;
                let offset = fastrand::u64(0..=jitter_ms.saturating_mul(2));
                let total_ms = (capped_ms - jitter_ms).saturating_add(offset);
                Duration::from_millis(total_ms).min(max)
            }
        }
    }
}

/// Configuration for the automatic retry policy.
///
/// Which errors are retried is decided by [`crate::is_retryable`] alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// The backoff strategy to use between attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with the default bounds.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Fixed `delay` between attempts.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub const fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff_with_jitter_stays_bounded() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for retry in 0..5 {
                let delay_ms = backoff.delay(retry).as_millis() as f64;
                let expected = (100.0 * 2_f64.powi(retry as i32)).min(1000.0);

                assert!(delay_ms >= expected * 0.49, "retry={retry}, delay_ms={delay_ms}");
                assert!(delay_ms <= expected * 1.51, "retry={retry}, delay_ms={delay_ms}");
                assert!(delay_ms <= 1000.0, "retry={retry}, delay_ms={delay_ms}");
            }
        }
    }

    #[test]
    fn test_exponential_backoff_with_unbounded_max_does_not_overflow() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            factor: 10.0,
            max: Duration::MAX,
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(u32::MAX), Duration::MAX);

        let jittered = Backoff::Exponential {
            base: Duration::from_secs(1),
            factor: 10.0,
            max: Duration::MAX,
            jitter: true,
        };
        assert!(jittered.delay(u32::MAX) <= Duration::MAX);
    }

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();

        assert_eq!(config.max_attempts, 3);
        assert!(config.allows_another(1));
        assert!(config.allows_another(2));
        assert!(!config.allows_another(3));
    }

    #[test]
    fn test_retry_config_fixed() {
        let config = RetryConfig::fixed(Duration::from_millis(500), 2);

        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.delay_for_retry(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_retry(1), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_deserializes_from_tagged_json() {
        let backoff: Backoff = serde_json::from_str(
            r#"{"strategy":"fixed","delay":{"secs":1,"nanos":0}}"#,
        )
        .expect("valid backoff json");

        assert_eq!(
            backoff,
            Backoff::Fixed {
                delay: Duration::from_secs(1)
            }
        );
    }
}
