//! Health and statistics snapshots.
//!
//! These are plain, immutable views. The circuit breaker, rate limiter and
//! retry policy own the live state; they only hand out copies of it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a per-dependency circuit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are short-circuited without touching the dependency.
    Open,
    /// A single probe call is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Read-only view of one dependency's circuit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyHealth {
    /// Dependency name (e.g. "ai-categorizer").
    pub name: String,
    /// Current circuit state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When `state` last changed.
    pub last_state_change: DateTime<Utc>,
    /// Successful calls inside the rolling window.
    pub rolling_success: u64,
    /// Failed calls inside the rolling window.
    pub rolling_failure: u64,
    /// How long the circuit has been open, if it is.
    #[serde(default, with = "opt_duration_secs")]
    pub open_for: Option<Duration>,
    /// When a call last succeeded.
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    /// When a call last failed.
    #[serde(default)]
    pub last_failure: Option<DateTime<Utc>>,
    /// Rendered error of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Mean response time over every timed call, in milliseconds.
    #[serde(default)]
    pub avg_response_ms: Option<f64>,
}

/// Read-only view of one dependency's token bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateBudget {
    /// Dependency name.
    pub dependency: String,
    /// Maximum tokens.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate_per_second: f64,
    /// Tokens available at snapshot time, `0 <= x <= capacity`.
    pub current_tokens: f64,
    /// When the bucket was last refilled.
    pub last_refill: DateTime<Utc>,
}

/// Retry bookkeeping for one dependency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RetryCounters {
    /// Logical operations started.
    pub calls: u64,
    /// Individual attempts made, including the first.
    pub attempts: u64,
    /// Attempts that were retries.
    pub retries: u64,
    /// Operations that gave up after `max_attempts`.
    pub exhausted: u64,
    /// Operations aborted by a terminal error.
    pub terminal: u64,
}

/// Request-level counters for the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RequestCounters {
    /// Messages processed.
    pub total: u64,
    /// Messages that failed (parse errors, throttling, cancellation).
    pub failed: u64,
    /// Candidates produced.
    pub candidates: u64,
    /// Candidates categorized by the AI service.
    pub ai_categorized: u64,
    /// Candidates categorized by the keyword fallback.
    pub fallback_used: u64,
}

impl RequestCounters {
    /// Share of candidates that needed the fallback, in `[0, 1]`.
    pub fn fallback_ratio(&self) -> f64 {
        let classified = self.ai_categorized + self.fallback_used;
        if classified == 0 {
            0.0
        } else {
            self.fallback_used as f64 / classified as f64
        }
    }
}

/// Aggregate health.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// All circuits closed.
    Healthy,
    /// One dependency is open or probing.
    Degraded,
    /// Two or more dependencies are open or probing.
    Unhealthy,
}

impl OverallStatus {
    /// Derive the aggregate from per-dependency circuits.
    pub fn from_dependencies(deps: &[DependencyHealth]) -> Self {
        let impaired = deps.iter().filter(|d| d.state != CircuitState::Closed).count();
        match impaired {
            0 => Self::Healthy,
            1 => Self::Degraded,
            _ => Self::Unhealthy,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Named retry counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyRetries {
    /// Dependency name.
    pub name: String,
    /// Counters for that dependency.
    pub counters: RetryCounters,
}

/// Point-in-time aggregate of process and dependency health.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    /// When the snapshot was produced.
    pub taken_at: DateTime<Utc>,
    /// Process uptime.
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    /// Resident memory in MiB, when the platform exposes it.
    pub memory_mb: Option<f64>,
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu_percent: Option<f64>,
    /// Aggregate status.
    pub status: OverallStatus,
    /// Per-dependency circuits.
    pub dependencies: Vec<DependencyHealth>,
    /// Per-dependency rate budgets.
    pub rate_budgets: Vec<RateBudget>,
    /// Per-dependency retry counters.
    pub retries: Vec<DependencyRetries>,
    /// Request counters.
    pub requests: RequestCounters,
}

/// Message latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50_ms: f64,
    /// 95th percentile.
    pub p95_ms: f64,
    /// 99th percentile.
    pub p99_ms: f64,
}

/// The lighter "stats" view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    /// Process uptime.
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    /// Request counters.
    pub requests: RequestCounters,
    /// `requests.fallback_ratio()` at snapshot time.
    pub fallback_ratio: f64,
    /// Latency over recent messages.
    pub latency: LatencyPercentiles,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

mod opt_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.map(|s| Duration::from_secs_f64(s.max(0.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, state: CircuitState) -> DependencyHealth {
        DependencyHealth {
            name: name.into(),
            state,
            consecutive_failures: 0,
            last_state_change: Utc::now(),
            rolling_success: 0,
            rolling_failure: 0,
            open_for: None,
            last_success: None,
            last_failure: None,
            last_error: None,
            avg_response_ms: None,
        }
    }

    #[test]
    fn overall_status_counts_impaired() {
        assert_eq!(OverallStatus::from_dependencies(&[]), OverallStatus::Healthy);
        assert_eq!(
            OverallStatus::from_dependencies(&[dep("a", CircuitState::Closed), dep("b", CircuitState::Open)]),
            OverallStatus::Degraded
        );
        assert_eq!(
            OverallStatus::from_dependencies(&[dep("a", CircuitState::HalfOpen), dep("b", CircuitState::Open)]),
            OverallStatus::Unhealthy
        );
    }

    #[test]
    fn fallback_ratio_handles_zero() {
        let counters = RequestCounters::default();
        assert_eq!(counters.fallback_ratio(), 0.0);

        let counters = RequestCounters {
            ai_categorized: 3,
            fallback_used: 1,
            ..Default::default()
        };
        assert!((counters.fallback_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn dependency_health_serializes_open_for_as_secs() {
        let mut d = dep("ai-categorizer", CircuitState::Open);
        d.open_for = Some(Duration::from_millis(1500));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["state"], "open");
        assert_eq!(json["open_for"], 1.5);

        let back: DependencyHealth = serde_json::from_value(json).unwrap();
        assert_eq!(back.open_for, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn dependency_health_reads_rows_without_call_details() {
        let json = serde_json::json!({
            "name": "ai-categorizer",
            "state": "closed",
            "consecutive_failures": 0,
            "last_state_change": "2026-01-01T00:00:00Z",
            "rolling_success": 2,
            "rolling_failure": 0
        });
        let d: DependencyHealth = serde_json::from_value(json).unwrap();
        assert_eq!(d.last_error, None);
        assert_eq!(d.avg_response_ms, None);
        assert!(d.last_success.is_none());
    }

    #[test]
    fn circuit_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(OverallStatus::Degraded.to_string(), "degraded");
    }
}
