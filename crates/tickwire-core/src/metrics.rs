//! Fetch and request metrics.
//!
//! The manager reports one [`FetchMetric`] per fetch and every [`Record`] a
//! provider produced. [`InMemoryCollector`] keeps lock-free counters and
//! rolls them up into [`Stats`] on read.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::recorder::Record;

/// One observed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetric {
    /// Provider that answered, or the last one tried for a failed fetch.
    pub provider: Option<String>,
    pub duration: Duration,
    pub success: bool,
    pub cached: bool,
}

impl FetchMetric {
    pub fn success(provider: impl Into<String>, duration: Duration) -> Self {
        Self {
            provider: Some(provider.into()),
            duration,
            success: true,
            cached: false,
        }
    }

    pub fn failure(provider: Option<String>, duration: Duration) -> Self {
        Self {
            provider,
            duration,
            success: false,
            cached: false,
        }
    }

    pub fn cache_hit(provider: impl Into<String>, duration: Duration) -> Self {
        Self {
            provider: Some(provider.into()),
            duration,
            success: true,
            cached: true,
        }
    }
}

/// Per-provider rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub fetches: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub requests: u64,
    pub failed_requests: u64,
    pub average_latency: Duration,
}

/// Aggregate snapshot returned by [`MetricsCollector::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_fetches: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub cache_hits: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub average_latency: Duration,
    pub providers: BTreeMap<String, ProviderStats>,
}

impl Stats {
    /// Successful share of all fetches, `0.0` when nothing ran yet.
    pub fn success_rate(&self) -> f64 {
        if self.total_fetches == 0 {
            return 0.0;
        }
        self.successful_fetches as f64 / self.total_fetches as f64
    }
}

/// Sink for fetch and request observations.
pub trait MetricsCollector: Send + Sync {
    fn record_fetch(&self, metric: &FetchMetric);

    fn record_request(&self, provider: &str, record: &Record);

    fn stats(&self) -> Stats;

    fn reset(&self);
}

/// Collector that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollector;

impl MetricsCollector for NoopCollector {
    fn record_fetch(&self, _metric: &FetchMetric) {}

    fn record_request(&self, _provider: &str, _record: &Record) {}

    fn stats(&self) -> Stats {
        Stats::default()
    }

    fn reset(&self) {}
}

#[derive(Debug, Default)]
struct ProviderCounters {
    fetches: AtomicU64,
    successful_fetches: AtomicU64,
    failed_fetches: AtomicU64,
    requests: AtomicU64,
    failed_requests: AtomicU64,
    latency_micros: AtomicU64,
}

impl ProviderCounters {
    fn snapshot(&self) -> ProviderStats {
        let fetches = self.fetches.load(Ordering::Relaxed);
        ProviderStats {
            fetches,
            successful_fetches: self.successful_fetches.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_latency: average(self.latency_micros.load(Ordering::Relaxed), fetches),
        }
    }
}

/// Thread-safe in-memory collector.
#[derive(Debug, Default)]
pub struct InMemoryCollector {
    total_fetches: AtomicU64,
    successful_fetches: AtomicU64,
    failed_fetches: AtomicU64,
    cache_hits: AtomicU64,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    latency_micros: AtomicU64,
    providers: RwLock<HashMap<String, Arc<ProviderCounters>>>,
}

impl InMemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn provider(&self, name: &str) -> Arc<ProviderCounters> {
        if let Some(counters) = self.providers.read().get(name) {
            return Arc::clone(counters);
        }
        let mut providers = self.providers.write();
        Arc::clone(providers.entry(name.to_owned()).or_default())
    }
}

impl MetricsCollector for InMemoryCollector {
    fn record_fetch(&self, metric: &FetchMetric) {
        let micros = duration_micros(metric.duration);

        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
        if metric.success {
            self.successful_fetches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_fetches.fetch_add(1, Ordering::Relaxed);
        }
        if metric.cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(name) = &metric.provider {
            let counters = self.provider(name);
            counters.fetches.fetch_add(1, Ordering::Relaxed);
            counters.latency_micros.fetch_add(micros, Ordering::Relaxed);
            if metric.success {
                counters.successful_fetches.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failed_fetches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_request(&self, provider: &str, record: &Record) {
        let counters = self.provider(provider);

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        counters.requests.fetch_add(1, Ordering::Relaxed);
        if !record.is_success() {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            counters.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> Stats {
        let total_fetches = self.total_fetches.load(Ordering::Relaxed);
        let providers = self
            .providers
            .read()
            .iter()
            .map(|(name, counters)| (name.clone(), counters.snapshot()))
            .collect();

        Stats {
            total_fetches,
            successful_fetches: self.successful_fetches.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_latency: average(self.latency_micros.load(Ordering::Relaxed), total_fetches),
            providers,
        }
    }

    fn reset(&self) {
        let mut providers = self.providers.write();
        providers.clear();
        for counter in [
            &self.total_fetches,
            &self.successful_fetches,
            &self.failed_fetches,
            &self.cache_hits,
            &self.total_requests,
            &self.failed_requests,
            &self.latency_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn average(total_micros: u64, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(total_micros / count)
}
