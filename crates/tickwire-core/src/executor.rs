//! Resilient request executor.
//!
//! [`ResilientClient`] turns one [`HttpRequest`] into one [`Exchange`]. Each
//! attempt waits on the rate limiter, asks the circuit breaker for
//! admission, then calls the transport under the per-attempt timeout. Only
//! errors the classifier marks retryable are tried again.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{build_cache_key, CacheLayer};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::classify::{classify, is_retryable};
use crate::config::ResilienceConfig;
use crate::context::{FetchContext, Interrupted};
use crate::error::{BoxError, ConfigError, ErrorKind, RequestError};
use crate::http_client::{
    Exchange, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestTransport,
    Transport,
};
use crate::recorder::Recorder;
use crate::retry::RetryConfig;
use crate::throttling::RateLimiter;
use crate::BoxFuture;

/// [`HttpClient`] applying timeout, circuit breaker, retry and rate limit
/// policies around a raw [`Transport`].
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    breaker: Option<CircuitBreaker>,
    limiter: Option<RateLimiter>,
    request_cache: Option<CacheLayer>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .field("limiter", &self.limiter)
            .field("request_cache", &self.request_cache)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new(
            Arc::new(ReqwestTransport::default()),
            &ResilienceConfig::default(),
        )
    }
}

enum AttemptOutcome {
    /// The transport was called and answered or failed.
    Sent {
        response: Option<HttpResponse>,
        error: Option<RequestError>,
    },
    /// The circuit breaker refused admission. No transport call was made.
    Rejected(RequestError),
    /// The context fired during the limiter wait or the call.
    Interrupted(RequestError),
}

impl ResilientClient {
    /// Client over `transport` with the policies `config` enables.
    pub fn new(transport: Arc<dyn Transport>, config: &ResilienceConfig) -> Self {
        Self {
            transport,
            timeout: config.timeout,
            retry: config.retry,
            breaker: config.circuit_breaker.map(CircuitBreaker::new),
            limiter: config.rate_limit.map(RateLimiter::new),
            request_cache: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Production client configured from `TICKWIRE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ResilienceConfig::from_env()?;
        Ok(Self::new(Arc::new(ReqwestTransport::default()), &config))
    }

    /// Answers repeated GET requests from `layer` while their entry lives.
    pub fn with_request_cache(mut self, layer: CacheLayer) -> Self {
        self.request_cache = Some(layer);
        self
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Current breaker state, if a breaker is configured.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Whether [`HttpClient::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn send(&self, ctx: &FetchContext, request: HttpRequest) -> Exchange {
        let mut recorder = Recorder::start(&request);

        if self.is_closed() {
            recorder.begin_attempt();
            let error = RequestError::new(ErrorKind::Unknown, "client is closed");
            return seal(recorder, None, Err(error));
        }

        let cache_key = self.request_cache_key(&request);
        if let Some(response) = self.cached_response(cache_key.as_deref()) {
            recorder.begin_attempt();
            recorder.mark_from_cache();
            tracing::debug!(
                record_id = recorder.id(),
                method = %request.method,
                url = %request.url,
                "request served from cache"
            );
            return seal(recorder, Some(response.clone()), Ok(response));
        }

        let mut last_response: Option<HttpResponse> = None;
        let mut last_error: Option<RequestError> = None;
        let result = loop {
            let outcome = self.attempt(ctx, &request, &mut recorder).await;
            let attempt = recorder.attempts();

            let error = match outcome {
                AttemptOutcome::Interrupted(error) => break Err(error),
                AttemptOutcome::Rejected(rejection) => match last_error.take() {
                    Some(previous) => {
                        tracing::debug!(
                            record_id = recorder.id(),
                            attempt,
                            method = %request.method,
                            url = %request.url,
                            rejection = %rejection,
                            "circuit opened between attempts"
                        );
                        break Err(previous);
                    }
                    None => break Err(rejection),
                },
                AttemptOutcome::Sent { response, error } => {
                    if response.is_some() {
                        last_response.clone_from(&response);
                    }
                    match (error, response) {
                        (None, Some(response)) => break Ok(response),
                        (Some(error), _) => error,
                        (None, None) => {
                            RequestError::new(ErrorKind::Unknown, "transport returned no response")
                        }
                    }
                }
            };

            let retry = match self.retry {
                Some(retry) if is_retryable(&error) && retry.allows_another(attempt) => retry,
                _ => break Err(error),
            };

            let delay = retry.delay_for_retry(attempt - 1);
            tracing::debug!(
                record_id = recorder.id(),
                attempt,
                method = %request.method,
                url = %request.url,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying request"
            );
            last_error = Some(error);

            if let Err(interrupted) = ctx.sleep(delay).await {
                break Err(classify_error(interrupted));
            }
        };

        match &result {
            Ok(response) => {
                if let (Some(layer), Some(key)) = (&self.request_cache, cache_key) {
                    if let Err(error) = layer.set_json(key, response) {
                        tracing::debug!(error = %error, "request cache write failed");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    record_id = recorder.id(),
                    attempt = recorder.attempts(),
                    method = %request.method,
                    url = %request.url,
                    kind = %error.kind(),
                    error = %error,
                    "request failed"
                );
            }
        }

        let response = match &result {
            Ok(response) => Some(response.clone()),
            Err(_) => last_response,
        };
        seal(recorder, response, result)
    }

    async fn attempt(
        &self,
        ctx: &FetchContext,
        request: &HttpRequest,
        recorder: &mut Recorder,
    ) -> AttemptOutcome {
        if let Some(limiter) = &self.limiter {
            if let Err(interrupted) = limiter.acquire(ctx).await {
                return AttemptOutcome::Interrupted(classify_error(interrupted));
            }
        }

        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                return AttemptOutcome::Rejected(RequestError::new(
                    ErrorKind::Unknown,
                    "circuit breaker is open",
                ));
            }
        }

        // Only admitted calls count as attempts.
        let attempt = recorder.begin_attempt();
        tracing::debug!(
            record_id = recorder.id(),
            attempt,
            method = %request.method,
            url = %request.url,
            "sending request"
        );

        let started = Instant::now();
        let call = self.transport.execute(request.clone());
        let bounded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, call)
                    .await
                    .unwrap_or_else(|_| {
                        Err(HttpError::timeout(format!(
                            "attempt timed out after {}ms",
                            timeout.as_millis()
                        )))
                    }),
                None => call.await,
            }
        };
        let result = ctx.run(bounded).await;
        recorder.add_call_time(started.elapsed());

        let (response, error) = match result {
            Err(interrupted) => return AttemptOutcome::Interrupted(classify_error(interrupted)),
            Ok(Err(error)) => (None, Some(classify_error(error))),
            Ok(Ok(response)) => {
                let error = classify(None, Some(response.status));
                (Some(response), error)
            }
        };

        if let Some(breaker) = &self.breaker {
            match &error {
                Some(error) if is_retryable(error) => breaker.record_failure(),
                _ => breaker.record_success(),
            }
        }

        AttemptOutcome::Sent { response, error }
    }

    fn request_cache_key(&self, request: &HttpRequest) -> Option<String> {
        if self.request_cache.is_none() || request.method != HttpMethod::Get {
            return None;
        }
        build_cache_key(request).ok()
    }

    fn cached_response(&self, key: Option<&str>) -> Option<HttpResponse> {
        let layer = self.request_cache.as_ref()?;
        match layer.get_json::<HttpResponse>(key?)? {
            Ok(response) => Some(response),
            Err(error) => {
                tracing::debug!(error = %error, "ignoring unreadable request cache entry");
                None
            }
        }
    }
}

impl HttpClient for ResilientClient {
    fn execute<'a>(&'a self, ctx: &'a FetchContext, request: HttpRequest) -> BoxFuture<'a, Exchange> {
        Box::pin(self.send(ctx, request))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("resilient client closed");
        }
    }
}

fn seal(
    recorder: Recorder,
    response: Option<HttpResponse>,
    result: Result<HttpResponse, RequestError>,
) -> Exchange {
    let error = result.as_ref().err().cloned();
    Exchange {
        record: recorder.finish(response, error),
        result,
    }
}

fn classify_error<E>(error: E) -> RequestError
where
    E: Into<BoxError> + Display,
{
    let message = error.to_string();
    classify(Some(error.into()), None)
        .unwrap_or_else(|| RequestError::new(ErrorKind::Unknown, message))
}

impl From<Interrupted> for RequestError {
    fn from(interrupted: Interrupted) -> Self {
        classify_error(interrupted)
    }
}
