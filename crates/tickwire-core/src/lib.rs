//! # Tickwire Core
//!
//! Fetch orchestration and resilient HTTP execution for the tickwire market
//! data toolkit.
//!
//! ## Overview
//!
//! This crate provides the plumbing shared by every data-source adapter:
//!
//! - **Fetch manager** with a provider registry, ordered fallback, and a
//!   two-level cache
//! - **Resilient executor** composing timeout, circuit breaker, retry, and
//!   rate limit policies around a raw transport
//! - **Error classification** into a closed taxonomy that drives retries
//! - **Immutable records and traces** of every HTTP call a fetch made
//! - **Metrics** aggregated per fetch and per provider
//!
//! Vendor adapters live outside this crate and implement [`Provider`].
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache capability, memory cache, two-level cache, cache keys |
//! | [`circuit_breaker`] | Rolling-window failure-rate breaker |
//! | [`classify`] | Error classifier and retryability predicate |
//! | [`config`] | Resilience and cache configuration, env loading |
//! | [`context`] | Cancellation and deadlines |
//! | [`error`] | Core error types |
//! | [`executor`] | Resilient request executor |
//! | [`http_client`] | HTTP values, transports, client capability |
//! | [`manager`] | Fetch manager |
//! | [`metrics`] | Metrics collectors |
//! | [`provider`] | Provider capability and registration metadata |
//! | [`recorder`] | Per-call records |
//! | [`retry`] | Backoff strategies |
//! | [`selector`] | Provider ordering |
//! | [`throttling`] | Rate limiting support |
//! | [`trace`] | Per-fetch request traces |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickwire_core::{FetchContext, FetchManager, RegisterOptions, TwoLevelCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager: FetchManager<QuoteQuery, Vec<Quote>> = FetchManager::builder()
//!         .cache(TwoLevelCache::default())
//!         .build();
//!
//!     manager.register_with(TencentProvider::new(), RegisterOptions::new().priority(10));
//!     manager.register_with(SinaProvider::new(), RegisterOptions::new().priority(5));
//!
//!     let result = manager.fetch(&FetchContext::new(), &QuoteQuery::new(["sh600000"])).await?;
//!     println!("{} answered in {:?}", result.provider, result.trace.total_time());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Fetch Manager  │────▶│ Two-Level Cache  │
//! └────────┬────────┘     └──────────────────┘
//!          │ selector order
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider        │────▶│ Request Trace    │
//! │ (Adapter Trait) │     │ (Records)        │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Resilient       │────▶│ Limiter, Breaker │
//! │ Client          │     │ Retry, Timeout   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Transport       │
//! │ (reqwest/noop)  │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every HTTP failure carries a classified [`ErrorKind`]. The manager keeps
//! the failover chain and the last provider error:
//!
//! ```rust
//! use tickwire_core::{ErrorKind, FetchError};
//!
//! fn handle_error(error: &FetchError) {
//!     match error.last_error().and_then(|last| last.kind()) {
//!         Some(ErrorKind::RateLimited) => {
//!             // Back off before fetching again
//!         }
//!         Some(ErrorKind::Auth) => {
//!             // Check provider credentials
//!         }
//!         Some(kind) if kind.is_retryable() => {
//!             // Transient, safe to try later
//!         }
//!         _ => {}
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod cache;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod manager;
pub mod metrics;
pub mod provider;
pub mod recorder;
pub mod retry;
pub mod selector;
pub mod throttling;
pub mod trace;

/// Boxed `Send` future returned by the object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-export commonly used types at crate root for convenience

// Caching
pub use cache::{build_cache_key, canonical_json, Cache, CacheLayer, MemoryCache, TwoLevelCache};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Classification
pub use classify::{classify, is_retryable};

// Configuration
pub use config::{CacheConfig, ResilienceConfig};

// Cancellation
pub use context::{FetchContext, Interrupted};

// Error types
pub use error::{
    BoxError, CacheError, ConfigError, ErrorKind, FetchError, ProviderError, ProviderFailure,
    RequestError,
};

// Executor
pub use executor::ResilientClient;

// HTTP client types
pub use http_client::{
    Exchange, HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse,
    NoopTransport, ReqwestTransport, Transport,
};

// Fetch manager
pub use manager::{FetchManager, FetchManagerBuilder, FetchResult};

// Metrics
pub use metrics::{
    FetchMetric, InMemoryCollector, MetricsCollector, NoopCollector, ProviderStats, Stats,
};

// Providers
pub use provider::{Market, Provider, ProviderInfo, RegisterOptions};

// Records
pub use recorder::{next_record_id, Record, Recorder};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Selection
pub use selector::{PrioritySelector, ProviderSelector, WeightedSelector};

// Throttling
pub use throttling::{RateLimitConfig, RateLimiter};

// Tracing
pub use trace::{next_fetch_id, RequestTrace};
