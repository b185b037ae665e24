//! Rolling-window circuit breaker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Runtime circuit state for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure share in `0.0..=1.0` that opens the circuit.
    pub failure_rate_threshold: f64,
    /// Outcomes required inside the window before the rate is evaluated.
    pub minimum_requests: u32,
    /// Rolling window over which outcomes are counted.
    pub window: Duration,
    /// Cool-down before an open circuit lets trial calls through.
    pub open_duration: Duration,
    /// Consecutive half-open successes needed to close again.
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_requests: 5,
            window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            half_open_successes: 2,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            half_open_successes: 0,
        }
    }
}

impl CircuitInner {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) > window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|(_, failed)| *failed).count();
        failures as f64 / self.outcomes.len() as f64
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.half_open_successes = 0;
        self.outcomes.clear();
    }
}

/// Thread-safe failure-rate circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admission check. An open circuit past its cool-down moves to half-open.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.config.open_duration)
                    .unwrap_or(false);

                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.half_open_successes = 0;
                    tracing::debug!("circuit breaker half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a healthy outcome. Closes a half-open circuit once enough arrive.
    pub fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.outcomes.push_back((now, false));
                inner.prune(now, self.config.window);
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes = inner.half_open_successes.saturating_add(1);
                if inner.half_open_successes >= self.config.half_open_successes.max(1) {
                    inner.state = CircuitState::Closed;
                    inner.half_open_successes = 0;
                    inner.outcomes.clear();
                    tracing::info!("circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed outcome. May open the circuit.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.outcomes.push_back((now, true));
                inner.prune(now, self.config.window);

                let enough = inner.outcomes.len() >= self.config.minimum_requests.max(1) as usize;
                let rate = inner.failure_rate();
                if enough && rate >= self.config.failure_rate_threshold {
                    inner.open(now);
                    tracing::warn!(failure_rate = rate, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.open(now);
                tracing::warn!("circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failure share of the outcomes currently inside the window.
    pub fn failure_rate(&self) -> f64 {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now(), self.config.window);
        inner.failure_rate()
    }

    /// Remaining cool-down while open.
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        inner
            .opened_at
            .map(|opened_at| self.config.open_duration.saturating_sub(opened_at.elapsed()))
    }
}
