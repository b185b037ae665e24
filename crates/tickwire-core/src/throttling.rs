//! Rate limiting support.
//!
//! Wraps a `governor` direct limiter. Waiting for a permit is raced against
//! the caller's [`FetchContext`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::Quota;
use serde::{Deserialize, Serialize};

use crate::context::{FetchContext, Interrupted};

/// Bounded call rate: at most `capacity` calls per `period`, refilled evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Permits available per `period`.
    pub capacity: u32,
    /// Window over which `capacity` refills.
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            period: Duration::from_secs(1),
        }
    }
}

type DirectRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket limiter whose waits observe the caller's context.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectRateLimiter>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(governor::RateLimiter::direct(quota_from_window(
                config.period,
                config.capacity,
            ))),
            config,
        }
    }

    /// Returns the configured rate.
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Takes one permit if available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits for a permit, giving up when the context is cancelled or expires.
    pub async fn acquire(&self, ctx: &FetchContext) -> Result<(), Interrupted> {
        if self.try_acquire() {
            return Ok(());
        }
        ctx.run(self.limiter.until_ready()).await
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_limited_to_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 2,
            period: Duration::from_secs(60),
        });

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1,
            period: Duration::from_millis(50),
        });
        let ctx = FetchContext::new();

        limiter.acquire(&ctx).await.expect("first permit is immediate");
        let started = std::time::Instant::now();
        limiter.acquire(&ctx).await.expect("second permit after refill");

        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn acquire_gives_up_when_context_expires() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1,
            period: Duration::from_secs(60),
        });
        assert!(limiter.try_acquire());

        let ctx = FetchContext::new().with_timeout(Duration::from_millis(20));
        let result = limiter.acquire(&ctx).await;

        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 0,
            period: Duration::from_secs(60),
        });

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
