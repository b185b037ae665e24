//! Error types shared across the executor and the fetch manager.
//!
//! [`RequestError`] is the classified outcome of one logical HTTP call. Its
//! [`ErrorKind`] is a closed taxonomy that drives retry decisions and tells
//! callers why a call failed. The manager-level [`FetchError`] only
//! aggregates provider failures and never reclassifies them.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Interrupted;

/// Boxed error accepted by the classifier and carried as a wrapped cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Closed error taxonomy. A successful call carries no kind at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimited,
    Auth,
    Server,
    Client,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [Self; 7] = [
        Self::Network,
        Self::Timeout,
        Self::RateLimited,
        Self::Auth,
        Self::Server,
        Self::Client,
        Self::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::Server => "server",
            Self::Client => "client",
            Self::Unknown => "unknown",
        }
    }

    /// The single retryability authority consulted by the retry policy.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Server | Self::RateLimited
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of one logical HTTP call.
///
/// The wrapped cause is kept for diagnostics through
/// [`std::error::Error::source`] but is not serialized, so a `RequestError`
/// restored from a cached result has no cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestError {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip)]
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl PartialEq for RequestError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.status == other.status
    }
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for RequestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Failure reported by a provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not supported by this provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn decode(message: impl Display) -> Self {
        Self::Decode(message.to_string())
    }

    /// Classified kind when the failure came from the HTTP layer.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Request(error) => Some(error.kind()),
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Unsupported(_) => None,
        }
    }
}

/// One entry of the failover chain kept by [`FetchError::AllProvidersFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, error: &ProviderError) -> Self {
        Self {
            provider: provider.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Top-level error returned by the fetch manager.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{}", describe_missing(.name))]
    NoProvider { name: Option<String> },

    #[error("all providers failed after {} attempt(s); last error: {last}", .attempts.len())]
    AllProvidersFailed {
        attempts: Vec<ProviderFailure>,
        #[source]
        last: ProviderError,
    },

    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl FetchError {
    pub const fn is_no_provider(&self) -> bool {
        matches!(self, Self::NoProvider { .. })
    }

    pub const fn is_all_providers_failed(&self) -> bool {
        matches!(self, Self::AllProvidersFailed { .. })
    }

    /// The provider error that ended the fetch, if any provider ran.
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            Self::AllProvidersFailed { last, .. } => Some(last),
            Self::Provider { source, .. } => Some(source),
            Self::NoProvider { .. } | Self::Interrupted(_) => None,
        }
    }
}

fn describe_missing(name: &Option<String>) -> String {
    match name {
        Some(name) => format!("no provider registered under '{name}'"),
        None => String::from("no provider registered"),
    }
}

/// Failure of a cache backend or of cache key/value serialization.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}
