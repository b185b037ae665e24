//! Multi-provider fetch manager.
//!
//! [`FetchManager`] owns the provider registry, the shared [`HttpClient`],
//! the optional [`TwoLevelCache`] and the metrics sink. A fetch tries the
//! fetch cache first, then walks the selector's chain until one provider
//! succeeds.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::{build_cache_key, TwoLevelCache};
use crate::config::ResilienceConfig;
use crate::context::FetchContext;
use crate::error::{FetchError, ProviderError, ProviderFailure};
use crate::executor::ResilientClient;
use crate::http_client::{HttpClient, ReqwestTransport, Transport};
use crate::metrics::{FetchMetric, MetricsCollector, NoopCollector, Stats};
use crate::provider::{Provider, ProviderInfo, RegisterOptions};
use crate::selector::{PrioritySelector, ProviderSelector};
use crate::trace::{next_fetch_id, RequestTrace};

/// Successful fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult<T> {
    pub data: T,
    pub trace: RequestTrace,
    pub provider: String,
    /// `true` when served from the fetch cache.
    pub cached: bool,
}

type SharedProvider<Req, Resp> = Arc<dyn Provider<Req, Resp>>;

struct Registered<Req, Resp> {
    info: ProviderInfo,
    provider: SharedProvider<Req, Resp>,
}

struct Registry<Req, Resp> {
    entries: HashMap<String, Registered<Req, Resp>>,
    order: Vec<String>,
}

impl<Req, Resp> Default for Registry<Req, Resp> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<Req, Resp> Registry<Req, Resp> {
    fn infos(&self) -> Vec<ProviderInfo> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.info.clone())
            .collect()
    }
}

/// Builder for [`FetchManager`].
pub struct FetchManagerBuilder<Req, Resp> {
    client: Option<Arc<dyn HttpClient>>,
    transport: Option<Arc<dyn Transport>>,
    resilience: ResilienceConfig,
    cache: Option<TwoLevelCache>,
    metrics: Option<Arc<dyn MetricsCollector>>,
    selector: Option<Arc<dyn ProviderSelector>>,
    _types: PhantomData<fn() -> (Req, Resp)>,
}

impl<Req, Resp> Default for FetchManagerBuilder<Req, Resp> {
    fn default() -> Self {
        Self {
            client: None,
            transport: None,
            resilience: ResilienceConfig::default(),
            cache: None,
            metrics: None,
            selector: None,
            _types: PhantomData,
        }
    }
}

impl<Req, Resp> FetchManagerBuilder<Req, Resp> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `client` as is. Overrides [`Self::transport`] and [`Self::resilience`].
    pub fn client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Transport under the default [`ResilientClient`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Policies of the default [`ResilientClient`].
    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = config;
        self
    }

    /// Enables both cache levels. The default client also uses the
    /// request layer for de-duplication.
    pub fn cache(mut self, cache: TwoLevelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Collector fed by every fetch. Defaults to [`NoopCollector`].
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fallback ordering. Defaults to [`PrioritySelector`].
    pub fn selector(mut self, selector: Arc<dyn ProviderSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Finishes the manager with an empty registry.
    pub fn build(self) -> FetchManager<Req, Resp> {
        let cache = self.cache;
        let client = match self.client {
            Some(client) => client,
            None => {
                let transport = self
                    .transport
                    .unwrap_or_else(|| Arc::new(ReqwestTransport::default()));
                let mut client = ResilientClient::new(transport, &self.resilience);
                if let Some(cache) = &cache {
                    client = client.with_request_cache(cache.request_layer().clone());
                }
                Arc::new(client)
            }
        };

        FetchManager {
            registry: RwLock::new(Registry::default()),
            client,
            cache,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopCollector)),
            selector: self.selector.unwrap_or_else(|| Arc::new(PrioritySelector)),
        }
    }
}

/// Provider registry with ordered fallback, caching and metrics.
pub struct FetchManager<Req, Resp> {
    registry: RwLock<Registry<Req, Resp>>,
    client: Arc<dyn HttpClient>,
    cache: Option<TwoLevelCache>,
    metrics: Arc<dyn MetricsCollector>,
    selector: Arc<dyn ProviderSelector>,
}

impl<Req, Resp> Default for FetchManager<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
{
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<Req, Resp> FetchManager<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn builder() -> FetchManagerBuilder<Req, Resp> {
        FetchManagerBuilder::new()
    }

    /// Registers a provider with default options.
    pub fn register<P>(&self, provider: P)
    where
        P: Provider<Req, Resp> + 'static,
    {
        self.register_with(provider, RegisterOptions::default());
    }

    /// Registers or replaces a provider. A replaced provider keeps its
    /// position in registration order.
    pub fn register_with<P>(&self, provider: P, options: RegisterOptions)
    where
        P: Provider<Req, Resp> + 'static,
    {
        let name = provider.name().to_owned();
        let info = ProviderInfo::new(name.clone(), options);
        tracing::info!(
            provider = %name,
            priority = info.priority,
            weight = info.weight,
            "registering provider"
        );

        let entry = Registered {
            info,
            provider: Arc::new(provider),
        };
        let mut registry = self.registry.write();
        if registry.entries.insert(name.clone(), entry).is_none() {
            registry.order.push(name);
        }
    }

    /// Removes a provider. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut registry = self.registry.write();
        if registry.entries.remove(name).is_none() {
            return false;
        }
        registry.order.retain(|registered| registered != name);
        true
    }

    /// Registration metadata of `name`.
    pub fn provider_info(&self, name: &str) -> Option<ProviderInfo> {
        self.registry
            .read()
            .entries
            .get(name)
            .map(|entry| entry.info.clone())
    }

    /// Registered providers in registration order.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.registry.read().infos()
    }

    /// Snapshot of the collector's aggregates.
    pub fn stats(&self) -> Stats {
        self.metrics.stats()
    }

    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    pub fn cache(&self) -> Option<&TwoLevelCache> {
        self.cache.as_ref()
    }

    /// Closes the shared client. Later fetches fail at the HTTP layer.
    pub fn close(&self) {
        self.client.close();
    }

    /// Fetch through the cache and the selector's fallback chain.
    pub async fn fetch(
        &self,
        ctx: &FetchContext,
        request: &Req,
    ) -> Result<FetchResult<Resp>, FetchError> {
        let started = Instant::now();

        let cache_key = self.fetch_cache_key(request);
        if let Some(hit) = self.cached_result(cache_key.as_deref()) {
            self.metrics
                .record_fetch(&FetchMetric::cache_hit(hit.provider.clone(), started.elapsed()));
            return Ok(hit);
        }

        // The registry lock is released before any provider runs.
        let (infos, providers) = self.snapshot();
        if infos.is_empty() {
            return Err(FetchError::NoProvider { name: None });
        }

        let chain = self.selector.select(&infos);
        let fetch_id = next_fetch_id();
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut last: Option<(String, ProviderError)> = None;

        for name in chain {
            if let Err(interrupted) = ctx.check() {
                tracing::debug!(fetch_id, error = %interrupted, "fetch interrupted");
                if last.is_none() {
                    self.metrics
                        .record_fetch(&FetchMetric::failure(None, started.elapsed()));
                    return Err(FetchError::Interrupted(interrupted));
                }
                break;
            }

            let Some(provider) = providers.get(&name) else {
                continue;
            };

            let mut trace = RequestTrace::new(fetch_id, name.clone());
            let outcome = provider
                .fetch(ctx, self.client.as_ref(), &mut trace, request)
                .await;
            trace.finish();
            for record in trace.records() {
                self.metrics.record_request(&name, record);
            }

            match outcome {
                Ok(data) => {
                    let result = FetchResult {
                        data,
                        trace,
                        provider: name.clone(),
                        cached: false,
                    };
                    self.store_result(cache_key, &result);
                    self.metrics
                        .record_fetch(&FetchMetric::success(name, started.elapsed()));
                    return Ok(result);
                }
                Err(error) => {
                    tracing::warn!(
                        fetch_id,
                        provider = %name,
                        requests = trace.total_requests(),
                        error = %error,
                        "provider failed, trying next"
                    );
                    failures.push(ProviderFailure::new(name.clone(), &error));
                    last = Some((name, error));
                }
            }
        }

        match last {
            Some((provider, last)) => {
                self.metrics
                    .record_fetch(&FetchMetric::failure(Some(provider), started.elapsed()));
                Err(FetchError::AllProvidersFailed {
                    attempts: failures,
                    last,
                })
            }
            None => Err(FetchError::NoProvider { name: None }),
        }
    }

    /// Fetch from exactly one named provider, without cache or fallback.
    pub async fn fetch_from(
        &self,
        ctx: &FetchContext,
        name: &str,
        request: &Req,
    ) -> Result<FetchResult<Resp>, FetchError> {
        let started = Instant::now();
        let provider = self
            .registry
            .read()
            .entries
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| FetchError::NoProvider {
                name: Some(name.to_owned()),
            })?;
        ctx.check()?;

        let mut trace = RequestTrace::new(next_fetch_id(), name);
        let outcome = provider
            .fetch(ctx, self.client.as_ref(), &mut trace, request)
            .await;
        trace.finish();
        for record in trace.records() {
            self.metrics.record_request(name, record);
        }

        match outcome {
            Ok(data) => {
                self.metrics
                    .record_fetch(&FetchMetric::success(name, started.elapsed()));
                Ok(FetchResult {
                    data,
                    trace,
                    provider: name.to_owned(),
                    cached: false,
                })
            }
            Err(source) => {
                tracing::warn!(provider = %name, error = %source, "provider failed");
                self.metrics.record_fetch(&FetchMetric::failure(
                    Some(name.to_owned()),
                    started.elapsed(),
                ));
                Err(FetchError::Provider {
                    provider: name.to_owned(),
                    source,
                })
            }
        }
    }

    fn snapshot(&self) -> (Vec<ProviderInfo>, HashMap<String, SharedProvider<Req, Resp>>) {
        let registry = self.registry.read();
        let providers = registry
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.provider)))
            .collect();
        (registry.infos(), providers)
    }

    fn fetch_cache_key(&self, request: &Req) -> Option<String> {
        self.cache.as_ref()?;
        match build_cache_key(request) {
            Ok(key) => Some(key),
            Err(error) => {
                tracing::warn!(error = %error, "fetch request is not cacheable");
                None
            }
        }
    }

    fn cached_result(&self, key: Option<&str>) -> Option<FetchResult<Resp>> {
        let layer = self.cache.as_ref()?.fetch_layer();
        let key = key?;
        match layer.get_json::<FetchResult<Resp>>(key)? {
            Ok(mut hit) => {
                hit.cached = true;
                tracing::debug!(provider = %hit.provider, "fetch served from cache");
                Some(hit)
            }
            Err(error) => {
                tracing::warn!(error = %error, "discarding unreadable fetch cache entry");
                layer.delete(key);
                None
            }
        }
    }

    fn store_result(&self, key: Option<String>, result: &FetchResult<Resp>) {
        let (Some(cache), Some(key)) = (&self.cache, key) else {
            return;
        };
        if let Err(error) = cache.fetch_layer().set_json(key, result) {
            tracing::warn!(provider = %result.provider, error = %error, "fetch cache write failed");
        }
    }
}
