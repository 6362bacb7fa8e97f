//! Per-dependency circuit breaker.
//!
//! # States
//!
//! ```text
//! Closed   --failure streak >= threshold-->  Open
//! Open     --acquire after cooldown------->  HalfOpen (one probe admitted)
//! HalfOpen --probe success---------------->  Closed
//! HalfOpen --probe failure---------------->  Open
//! ```
//!
//! Every state change goes through [`CircuitBreaker::apply`], so the
//! transition table lives in exactly one `match`. Callers never touch the
//! state directly: they [`acquire`](CircuitBreaker::acquire) a [`CallPermit`]
//! and resolve it with [`success`](CallPermit::success) or
//! [`failure`](CallPermit::failure). A permit dropped unresolved counts as a
//! failure, so a cancelled probe cannot leave the breaker stuck half-open.
//!
//! Resolving with [`success_in`](CallPermit::success_in) or
//! [`failure_with`](CallPermit::failure_with) also records the response time
//! and the error text, which the snapshot reports next to the circuit state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use purse_types::config::CircuitConfig;
use purse_types::health::{CircuitState, DependencyHealth};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CategorizeError;

/// Something that happened to a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitEvent {
    /// A caller wants to make a call.
    Acquire,
    /// An admitted call succeeded.
    Success {
        /// Whether the call was the half-open probe.
        probe: bool,
    },
    /// An admitted call failed (or its permit was dropped).
    Failure {
        /// Whether the call was the half-open probe.
        probe: bool,
    },
}

/// What [`CircuitBreaker::apply`] decided for an [`CircuitEvent::Acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Admitted {
        /// The call is the single half-open probe.
        probe: bool,
    },
    /// The call is short-circuited.
    Rejected,
    /// The event was a result, not an acquisition.
    Recorded,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

impl State {
    fn public(self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    streak_started: Option<Instant>,
    outcomes: VecDeque<(Instant, bool)>,
    last_state_change: DateTime<Utc>,
    calls: CallDetails,
}

/// Last-outcome bookkeeping, independent of the rolling window.
#[derive(Default)]
struct CallDetails {
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
    timed_calls: u64,
    total_response: Duration,
}

impl CallDetails {
    fn avg_response_ms(&self) -> Option<f64> {
        (self.timed_calls > 0).then(|| self.total_response.as_micros() as f64 / 1000.0 / self.timed_calls as f64)
    }
}

/// Circuit breaker for one dependency.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    window: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: &CircuitConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            window: config.window(),
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                streak_started: None,
                outcomes: VecDeque::new(),
                last_state_change: Utc::now(),
                calls: CallDetails::default(),
            }),
        }
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state.public()
    }

    /// Ask to make a call.
    ///
    /// # Errors
    ///
    /// [`CategorizeError::CircuitOpen`] while open, or while a half-open
    /// probe is already in flight.
    pub fn acquire(self: &Arc<Self>) -> Result<CallPermit, CategorizeError> {
        match self.apply(CircuitEvent::Acquire) {
            Admission::Admitted { probe } => Ok(CallPermit {
                breaker: Arc::clone(self),
                probe,
                resolved: false,
            }),
            Admission::Rejected | Admission::Recorded => Err(CategorizeError::CircuitOpen {
                dependency: self.name.clone(),
            }),
        }
    }

    /// The single mutation entry point.
    pub fn apply(&self, event: CircuitEvent) -> Admission {
        let now = Instant::now();
        let mut inner = self.lock();

        match (inner.state, event) {
            (State::Closed, CircuitEvent::Acquire) => Admission::Admitted { probe: false },

            (State::Open { since }, CircuitEvent::Acquire) => {
                if now.saturating_duration_since(since) >= self.cooldown {
                    self.transition(&mut inner, State::HalfOpen { probe_in_flight: true });
                    Admission::Admitted { probe: true }
                } else {
                    Admission::Rejected
                }
            }

            (State::HalfOpen { probe_in_flight: true }, CircuitEvent::Acquire) => Admission::Rejected,
            (State::HalfOpen { probe_in_flight: false }, CircuitEvent::Acquire) => {
                inner.state = State::HalfOpen { probe_in_flight: true };
                Admission::Admitted { probe: true }
            }

            (state, CircuitEvent::Success { probe }) => {
                self.record(&mut inner, now, true);
                inner.calls.last_success = Some(Utc::now());
                inner.consecutive_failures = 0;
                inner.streak_started = None;
                if probe && matches!(state, State::HalfOpen { .. }) {
                    self.transition(&mut inner, State::Closed);
                }
                Admission::Recorded
            }

            (state, CircuitEvent::Failure { probe }) => {
                self.record(&mut inner, now, false);
                inner.calls.last_failure = Some(Utc::now());
                self.extend_streak(&mut inner, now);
                match state {
                    State::HalfOpen { .. } if probe => {
                        self.transition(&mut inner, State::Open { since: now });
                    }
                    State::Closed if inner.consecutive_failures >= self.failure_threshold => {
                        self.transition(&mut inner, State::Open { since: now });
                    }
                    _ => {}
                }
                Admission::Recorded
            }
        }
    }

    /// Read-only view for health reporting.
    pub fn snapshot(&self) -> DependencyHealth {
        let now = Instant::now();
        let mut inner = self.lock();
        self.prune(&mut inner, now);

        let rolling_success = inner.outcomes.iter().filter(|(_, ok)| *ok).count() as u64;
        let rolling_failure = inner.outcomes.len() as u64 - rolling_success;
        let open_for = match inner.state {
            State::Open { since } => Some(now.saturating_duration_since(since)),
            _ => None,
        };

        DependencyHealth {
            name: self.name.clone(),
            state: inner.state.public(),
            consecutive_failures: inner.consecutive_failures,
            last_state_change: inner.last_state_change,
            rolling_success,
            rolling_failure,
            open_for,
            last_success: inner.calls.last_success,
            last_failure: inner.calls.last_failure,
            last_error: inner.calls.last_error.clone(),
            avg_response_ms: inner.calls.avg_response_ms(),
        }
    }

    fn note_call(&self, response: Option<Duration>, error: Option<String>) {
        let mut inner = self.lock();
        if let Some(response) = response {
            inner.calls.timed_calls += 1;
            inner.calls.total_response += response;
        }
        if error.is_some() {
            inner.calls.last_error = error;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn extend_streak(&self, inner: &mut Inner, now: Instant) {
        let expired = inner
            .streak_started
            .is_some_and(|start| now.saturating_duration_since(start) > self.window);
        if inner.consecutive_failures == 0 || expired {
            inner.consecutive_failures = 1;
            inner.streak_started = Some(now);
        } else {
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        }
    }

    fn record(&self, inner: &mut Inner, now: Instant, ok: bool) {
        inner.outcomes.push_back((now, ok));
        self.prune(inner, now);
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.saturating_duration_since(at) > self.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        let from = inner.state.public();
        inner.state = next;
        inner.last_state_change = Utc::now();
        match next {
            State::Open { .. } => warn!(
                dependency = %self.name,
                %from,
                failures = inner.consecutive_failures,
                "circuit opened"
            ),
            State::HalfOpen { .. } => debug!(dependency = %self.name, %from, "circuit half-open, probing"),
            State::Closed => info!(dependency = %self.name, %from, "circuit closed"),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Permission to make one call through a breaker.
///
/// Must be resolved with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unresolved records a failure.
#[must_use = "an unresolved permit is recorded as a failure"]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    resolved: bool,
}

impl CallPermit {
    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Record a successful call.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.apply(CircuitEvent::Success { probe: self.probe });
    }

    /// Record a failed call.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.apply(CircuitEvent::Failure { probe: self.probe });
    }

    /// Record a successful call that took `response`.
    pub fn success_in(self, response: Duration) {
        self.breaker.note_call(Some(response), None);
        self.success();
    }

    /// Record a failed call that took `response` and ended with `error`.
    pub fn failure_with(self, response: Duration, error: impl Into<String>) {
        self.breaker.note_call(Some(response), Some(error.into()));
        self.failure();
    }
}

impl std::fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPermit")
            .field("dependency", &self.breaker.name)
            .field("probe", &self.probe)
            .finish()
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(dependency = %self.breaker.name, "call permit dropped unresolved");
            self.breaker.note_call(None, Some("call abandoned before completion".into()));
            self.breaker.apply(CircuitEvent::Failure { probe: self.probe });
        }
    }
}

/// Process-wide set of breakers, created lazily per dependency.
pub struct CircuitBreakerRegistry {
    config: CircuitConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry; every breaker uses `config`.
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `dependency`, created on first use.
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(dependency) {
            return Arc::clone(&breaker);
        }
        let entry = self
            .breakers
            .entry(dependency.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(dependency, &self.config)));
        Arc::clone(&entry)
    }

    /// Acquire a permit from `dependency`'s breaker.
    pub fn acquire(&self, dependency: &str) -> Result<CallPermit, CategorizeError> {
        self.breaker(dependency).acquire()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<DependencyHealth> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.iter().map(|e| Arc::clone(e.value())).collect();
        let mut snapshots: Vec<DependencyHealth> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64, window_secs: u64) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "ai",
            &CircuitConfig {
                failure_threshold: threshold,
                cooldown_secs,
                window_secs,
            },
        ))
    }

    fn fail(b: &Arc<CircuitBreaker>, times: u32) {
        for _ in 0..times {
            b.acquire().unwrap().failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold() {
        let b = breaker(3, 60, 60);
        fail(&b, 2);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b, 1);
        assert_eq!(b.state(), CircuitState::Open);

        let err = b.acquire().unwrap_err();
        assert_eq!(err, CategorizeError::CircuitOpen { dependency: "ai".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_streak() {
        let b = breaker(3, 60, 60);
        fail(&b, 2);
        b.acquire().unwrap().success();
        fail(&b, 2);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_streak_restarts() {
        let b = breaker(3, 60, 10);
        fail(&b, 2);
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&b, 1);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_single_probe() {
        let b = breaker(1, 30, 60);
        fail(&b, 1);
        assert!(b.acquire().is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        let probe = b.acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.acquire().is_err(), "second caller must be rejected while probing");

        probe.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens() {
        let b = breaker(1, 30, 60);
        fail(&b, 1);
        tokio::time::advance(Duration::from_secs(31)).await;
        b.acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);

        // Cooldown restarts from the failed probe.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(b.acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_permit_counts_as_failure() {
        let b = breaker(2, 60, 60);
        drop(b.acquire().unwrap());
        drop(b.acquire().unwrap());
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_probe_does_not_wedge_half_open() {
        let b = breaker(1, 5, 60);
        fail(&b, 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        drop(b.acquire().unwrap());
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(b.acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn late_results_do_not_close_open_circuit() {
        let b = breaker(1, 60, 60);
        let early = b.acquire().unwrap();
        fail(&b, 1);
        assert_eq!(b.state(), CircuitState::Open);
        early.success();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_rolls_window() {
        let b = breaker(10, 60, 10);
        b.acquire().unwrap().success();
        fail(&b, 2);

        let snap = b.snapshot();
        assert_eq!(snap.name, "ai");
        assert_eq!(snap.rolling_success, 1);
        assert_eq!(snap.rolling_failure, 2);
        assert!(snap.open_for.is_none());

        tokio::time::advance(Duration::from_secs(11)).await;
        let snap = b.snapshot();
        assert_eq!(snap.rolling_success + snap.rolling_failure, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_open_duration() {
        let b = breaker(1, 60, 60);
        fail(&b, 1);
        tokio::time::advance(Duration::from_secs(7)).await;
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.open_for, Some(Duration::from_secs(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_keeps_call_details() {
        let b = breaker(10, 60, 60);
        let snap = b.snapshot();
        assert!(snap.last_success.is_none());
        assert!(snap.avg_response_ms.is_none());

        b.acquire().unwrap().success_in(Duration::from_millis(100));
        b.acquire().unwrap().failure_with(Duration::from_millis(300), "retries exhausted: timeout");

        let snap = b.snapshot();
        assert!(snap.last_success.is_some());
        assert!(snap.last_failure.is_some());
        assert_eq!(snap.last_error.as_deref(), Some("retries exhausted: timeout"));
        assert_eq!(snap.avg_response_ms, Some(200.0));

        // A later success keeps the last error text.
        b.acquire().unwrap().success_in(Duration::from_millis(200));
        let snap = b.snapshot();
        assert_eq!(snap.last_error.as_deref(), Some("retries exhausted: timeout"));
        assert_eq!(snap.avg_response_ms, Some(200.0));

        // Details outlive the rolling window.
        tokio::time::advance(Duration::from_secs(61)).await;
        let snap = b.snapshot();
        assert_eq!(snap.rolling_success + snap.rolling_failure, 0);
        assert!(snap.last_success.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_permit_leaves_error_text() {
        let b = breaker(5, 60, 60);
        drop(b.acquire().unwrap());
        let snap = b.snapshot();
        assert_eq!(snap.last_error.as_deref(), Some("call abandoned before completion"));
        assert!(snap.last_failure.is_some());
        assert!(snap.avg_response_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn registry_isolates_dependencies() {
        let registry = CircuitBreakerRegistry::new(CircuitConfig {
            failure_threshold: 1,
            cooldown_secs: 60,
            window_secs: 60,
        });
        registry.acquire("a").unwrap().failure();
        assert!(registry.acquire("a").is_err());
        assert!(registry.acquire("b").is_ok());

        let names: Vec<String> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
