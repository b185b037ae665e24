//! Provider capability and registration metadata.
//!
//! A [`Provider`] adapts one upstream vendor. The fetch manager stores each
//! registered provider next to a [`ProviderInfo`] that the selectors rank.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::context::FetchContext;
use crate::error::ProviderError;
use crate::http_client::HttpClient;
use crate::trace::RequestTrace;
use crate::BoxFuture;

/// Market code a provider serves, such as `sh`, `sz` or `hk`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Market(String);

impl Market {
    /// Wraps a market code as given.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the market code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Market {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Pluggable data-source adapter.
///
/// Adapters issue their HTTP calls through the shared [`HttpClient`] and
/// append every resulting record to `trace`, including on failure, usually
/// via [`RequestTrace::record_exchange`].
pub trait Provider<Req, Resp>: Send + Sync {
    /// Registry key. Must be stable for the provider's lifetime.
    fn name(&self) -> &str;

    /// Markets this provider serves. Empty means unrestricted.
    fn supported_markets(&self) -> Vec<Market> {
        Vec::new()
    }

    /// Whether `symbol` is in scope for this provider.
    fn can_handle(&self, symbol: &str) -> bool {
        let _ = symbol;
        true
    }

    /// Runs one request, recording every HTTP call into `trace`.
    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        client: &'a dyn HttpClient,
        trace: &'a mut RequestTrace,
        request: &'a Req,
    ) -> BoxFuture<'a, Result<Resp, ProviderError>>;
}

/// Registration metadata used by the selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub priority: i32,
    pub weight: u32,
    pub tags: BTreeMap<String, String>,
}

impl ProviderInfo {
    /// Builds the metadata stored for a registration.
    pub fn new(name: impl Into<String>, options: RegisterOptions) -> Self {
        Self {
            name: name.into(),
            priority: options.priority,
            weight: options.weight,
            tags: options.tags,
        }
    }
}

/// Options for [`crate::FetchManager::register_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    priority: i32,
    weight: u32,
    tags: BTreeMap<String, String>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            weight: 1,
            tags: BTreeMap::new(),
        }
    }
}

impl RegisterOptions {
    /// Priority 0, weight 1, no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority. Higher runs earlier.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the weight used by [`crate::WeightedSelector`].
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Adds a free-form tag.
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }
}
