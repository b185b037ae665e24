//! Immutable records of logical HTTP calls.
//!
//! A [`Recorder`] follows one call while it runs (attempts, time spent on the
//! wire, cache origin, tags) and is consumed by [`Recorder::finish`], which
//! seals everything into a [`Record`]. Records have no mutating methods.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::RequestError;
use crate::http_client::{HttpRequest, HttpResponse};

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique record id.
pub fn next_record_id() -> u64 {
    NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Sealed audit entry for one logical HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: u64,
    request: HttpRequest,
    response: Option<HttpResponse>,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    duration: Duration,
    error: Option<RequestError>,
    attempts: u32,
    from_cache: bool,
    tags: BTreeMap<String, String>,
}

impl Record {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Last response received, also kept when the call failed.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub const fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Time spent inside transport calls, summed over attempts.
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// In-progress record for a call that has not finished yet.
#[derive(Debug)]
pub struct Recorder {
    id: u64,
    request: HttpRequest,
    started_at: OffsetDateTime,
    call_time: Duration,
    attempts: u32,
    from_cache: bool,
    tags: BTreeMap<String, String>,
}

impl Recorder {
    pub fn start(request: &HttpRequest) -> Self {
        Self {
            id: next_record_id(),
            request: request.clone(),
            started_at: OffsetDateTime::now_utc(),
            call_time: Duration::ZERO,
            attempts: 0,
            from_cache: false,
            tags: BTreeMap::new(),
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Counts a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn add_call_time(&mut self, elapsed: Duration) {
        self.call_time = self.call_time.saturating_add(elapsed);
    }

    pub fn mark_from_cache(&mut self) {
        self.from_cache = true;
    }

    pub fn tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(name.into(), value.into());
    }

    /// Seals the record. The attempt count is reported as at least one.
    pub fn finish(self, response: Option<HttpResponse>, error: Option<RequestError>) -> Record {
        Record {
            id: self.id,
            request: self.request,
            response,
            started_at: self.started_at,
            duration: self.call_time,
            error,
            attempts: self.attempts.max(1),
            from_cache: self.from_cache,
            tags: self.tags,
        }
    }
}
