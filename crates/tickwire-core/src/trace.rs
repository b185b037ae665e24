//! Per-fetch request traces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::RequestError;
use crate::http_client::{Exchange, HttpResponse};
use crate::recorder::Record;

static NEXT_FETCH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique fetch id, shared by every provider tried in one fetch.
pub fn next_fetch_id() -> u64 {
    NEXT_FETCH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Ordered [`Record`]s produced while one provider worked on one fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrace {
    fetch_id: u64,
    provider: String,
    records: Vec<Record>,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(skip)]
    started: Option<Instant>,
    total_time: Option<Duration>,
}

impl RequestTrace {
    pub fn new(fetch_id: u64, provider: impl Into<String>) -> Self {
        Self {
            fetch_id,
            provider: provider.into(),
            records: Vec::new(),
            started_at: OffsetDateTime::now_utc(),
            started: Some(Instant::now()),
            total_time: None,
        }
    }

    pub const fn fetch_id(&self) -> u64 {
        self.fetch_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub const fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Appends a record. `None` is ignored.
    pub fn add_request(&mut self, record: impl Into<Option<Record>>) {
        if let Some(record) = record.into() {
            self.records.push(record);
        }
    }

    /// Keeps the exchange's record and hands back its outcome.
    pub fn record_exchange(&mut self, exchange: Exchange) -> Result<HttpResponse, RequestError> {
        let (result, record) = exchange.into_parts();
        self.records.push(record);
        result
    }

    /// Freezes the elapsed wall time. Later calls keep the first value.
    pub fn finish(&mut self) {
        if self.total_time.is_none() {
            self.total_time = Some(
                self.started
                    .map(|started| started.elapsed())
                    .unwrap_or_default(),
            );
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn success_requests(&self) -> usize {
        self.records.iter().filter(|record| record.is_success()).count()
    }

    pub fn failed_requests(&self) -> usize {
        self.records.len() - self.success_requests()
    }

    pub fn total_requests(&self) -> usize {
        self.records.len()
    }

    /// Sum of record durations. Independent of [`RequestTrace::total_time`].
    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(Record::duration).sum()
    }

    /// Wall time frozen by [`RequestTrace::finish`], `None` before that.
    pub const fn total_time(&self) -> Option<Duration> {
        self.total_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http_client::HttpRequest;
    use crate::recorder::Recorder;

    fn record(call_time: Duration, error: Option<RequestError>) -> Record {
        let mut recorder = Recorder::start(&HttpRequest::get("https://example.test"));
        recorder.begin_attempt();
        recorder.add_call_time(call_time);
        recorder.finish(None, error)
    }

    #[test]
    fn counts_successes_and_failures() {
        let mut trace = RequestTrace::new(next_fetch_id(), "tencent");
        trace.add_request(record(Duration::from_millis(10), None));
        trace.add_request(record(
            Duration::from_millis(20),
            Some(RequestError::new(ErrorKind::Server, "server error: HTTP 500")),
        ));
        trace.add_request(record(Duration::from_millis(30), None));
        trace.add_request(None);

        assert_eq!(trace.success_requests(), 2);
        assert_eq!(trace.failed_requests(), 1);
        assert_eq!(trace.total_requests(), 3);
        assert_eq!(trace.total_duration(), Duration::from_millis(60));
    }

    #[test]
    fn finish_freezes_the_first_elapsed_value() {
        let mut trace = RequestTrace::new(1, "sina");
        assert!(trace.total_time().is_none());

        trace.finish();
        let first = trace.total_time();
        std::thread::sleep(Duration::from_millis(5));
        trace.finish();

        assert!(first.is_some());
        assert_eq!(trace.total_time(), first);
    }

    #[test]
    fn fetch_ids_are_unique() {
        let first = next_fetch_id();
        let second = next_fetch_id();
        assert_ne!(first, second);
    }

    #[test]
    fn empty_trace_has_zero_duration() {
        let trace = RequestTrace::new(7, "eastmoney");
        assert_eq!(trace.total_duration(), Duration::ZERO);
        assert_eq!(trace.failed_requests(), 0);
        assert_eq!(trace.fetch_id(), 7);
        assert_eq!(trace.provider(), "eastmoney");
    }
}
