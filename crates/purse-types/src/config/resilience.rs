//! Resilience settings: token bucket, circuit breaker and retry.
//!
//! One set of values applies to every external dependency; the registries
//! in `purse-core` create per-dependency state from it lazily.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PurseError, Result};

/// Protective shell around external calls.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResilienceConfig {
    /// Token bucket per dependency.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker per dependency.
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Retry with exponential backoff.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl ResilienceConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(PurseError::ConfigInvalid {
                reason: reason.to_string(),
            })
        };
        if self.rate_limit.requests_per_minute == 0 {
            return invalid("resilience.rate_limit.requests_per_minute must be > 0");
        }
        if self.rate_limit.burst == 0 {
            return invalid("resilience.rate_limit.burst must be > 0");
        }
        if self.circuit.failure_threshold == 0 {
            return invalid("resilience.circuit.failure_threshold must be > 0");
        }
        if self.retry.max_attempts == 0 {
            return invalid("resilience.retry.max_attempts must be >= 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("resilience.retry.base_delay_ms must not exceed max_delay_ms");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return invalid("resilience.retry.jitter_fraction must be within [0, 1]");
        }
        Ok(())
    }
}

/// Token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained rate; the bucket refills at `requests_per_minute / 60` tokens per second.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How long a caller may wait for a token before giving up.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_requests_per_minute() -> u32 {
    60
}
fn default_burst() -> u32 {
    5
}
fn default_acquire_timeout_ms() -> u64 {
    2_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Tokens added per second.
    pub fn refill_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    /// Maximum wait for a token.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open circuit waits before admitting a probe.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Width of the rolling success/failure window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_window_secs() -> u64 {
    60
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            window_secs: default_window_secs(),
        }
    }
}

impl CircuitConfig {
    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Rolling window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Retry settings as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random spread applied to each delay, in `[0, 1]`.
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_jitter_fraction() -> f64 {
    0.2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ResilienceConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.rate_limit.refill_per_second(), 1.0);
        assert_eq!(cfg.circuit.cooldown(), Duration::from_secs(60));
        assert_eq!(cfg.rate_limit.acquire_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_zero_burst() {
        let mut cfg = ResilienceConfig::default();
        cfg.rate_limit.burst = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("burst"));
    }

    #[test]
    fn rejects_inverted_delays() {
        let mut cfg = ResilienceConfig::default();
        cfg.retry.base_delay_ms = 10_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let mut cfg = ResilienceConfig::default();
        cfg.retry.jitter_fraction = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ResilienceConfig =
            serde_json::from_str(r#"{"circuit": {"failure_threshold": 2}}"#).unwrap();
        assert_eq!(cfg.circuit.failure_threshold, 2);
        assert_eq!(cfg.circuit.cooldown_secs, 60);
        assert_eq!(cfg.retry.max_attempts, 3);
    }
}
