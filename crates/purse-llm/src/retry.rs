//! Exponential backoff retry for provider calls.
//!
//! [`RetryPolicy::run`] drives an async operation until it succeeds, fails
//! with a terminal error, or runs out of attempts. Errors are classified by
//! [`classify`]: timeouts, transport failures, HTTP 408/429/5xx are
//! transient; everything else is terminal and never retried.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use purse_types::config::RetrySettings;
use purse_types::health::RetryCounters;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500 ms).
    pub base_delay: Duration,
    /// Maximum delay between attempts (default: 8 seconds).
    pub max_delay: Duration,
    /// Each delay is scaled by a random factor in `1 ± jitter_fraction`
    /// (default: 0.2).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_fraction: 0.2,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            jitter_fraction: s.jitter_fraction.clamp(0.0, 1.0),
        }
    }
}

/// Whether an error is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed if tried again.
    Transient,
    /// Will fail the same way every time.
    Terminal,
}

/// Classify a [`ProviderError`].
pub fn classify(err: &ProviderError) -> ErrorClass {
    match err {
        ProviderError::RateLimited { .. }
        | ProviderError::Timeout
        | ProviderError::RequestFailed(_)
        | ProviderError::Http(_) => ErrorClass::Transient,
        ProviderError::Status { status, .. } if *status == 408 || *status >= 500 => ErrorClass::Transient,
        ProviderError::Status { .. }
        | ProviderError::AuthFailed(_)
        | ProviderError::NotConfigured(_)
        | ProviderError::InvalidResponse(_)
        | ProviderError::Json(_) => ErrorClass::Terminal,
    }
}

/// Delay after failed attempt `attempt` (1-indexed), before jitter:
/// `min(max_delay, base_delay * 2^(attempt - 1))`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    Duration::from_millis(raw_ms.min(config.max_delay.as_millis() as u64))
}

/// Delay after failed attempt `attempt` (1-indexed) with jitter applied,
/// never above `max_delay`.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = backoff_delay(config, attempt);
    let factor = if config.jitter_fraction > 0.0 {
        let j = config.jitter_fraction;
        1.0 + rand::thread_rng().gen_range(-j..=j)
    } else {
        1.0
    };
    base.mul_f64(factor.max(0.0)).min(config.max_delay)
}

/// Delay for a specific error: a rate-limit hint wins when it is longer,
/// still capped at `max_delay`.
fn delay_for(config: &RetryConfig, attempt: u32, err: &ProviderError) -> Duration {
    let computed = compute_delay(config, attempt);
    match err {
        ProviderError::RateLimited { retry_after_ms } => computed
            .max(Duration::from_millis(*retry_after_ms))
            .min(config.max_delay),
        _ => computed,
    }
}

/// Why a retried operation gave up.
#[derive(Error, Debug)]
pub enum RetryError {
    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: ProviderError,
    },

    /// An attempt failed with an error that retrying cannot fix.
    #[error("terminal error on attempt {attempt}: {source}")]
    Terminal {
        /// The attempt that failed (1-indexed).
        attempt: u32,
        /// The terminal error.
        #[source]
        source: ProviderError,
    },
}

impl RetryError {
    /// The underlying provider error.
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal { source, .. } => source,
        }
    }

    /// `true` for [`RetryError::Terminal`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    terminal: AtomicU64,
}

/// Retries transient failures with exponential backoff and keeps counters.
///
/// # Example
///
/// ```rust,ignore
/// let policy = RetryPolicy::new("ai-categorizer", RetryConfig::default());
/// let response = policy.run(|_attempt| provider.complete(&request)).await?;
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
    counters: Counters,
}

impl RetryPolicy {
    /// Create a policy for the named dependency.
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            name: name.into(),
            config,
            counters: Counters::default(),
        }
    }

    /// Dependency name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.config
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> RetryCounters {
        RetryCounters {
            calls: self.counters.calls.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            terminal: self.counters.terminal.load(Ordering::Relaxed),
        }
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);
            if attempt > 1 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }

            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(dependency = %self.name, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if classify(&err) == ErrorClass::Terminal {
                self.counters.terminal.fetch_add(1, Ordering::Relaxed);
                return Err(RetryError::Terminal { attempt, source: err });
            }

            if attempt >= max_attempts {
                self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(dependency = %self.name, attempts = attempt, error = %err, "retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = delay_for(&self.config, attempt, &err);
            warn!(
                dependency = %self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_fraction: 0.0,
        }
    }

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn default_retry_config() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.base_delay, Duration::from_millis(500));
        assert_eq!(cfg.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn from_settings_clamps() {
        let settings = RetrySettings {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 20,
            jitter_fraction: 3.0,
        };
        let cfg = RetryConfig::from(&settings);
        assert_eq!(cfg.max_attempts, 1);
        assert_eq!(cfg.jitter_fraction, 1.0);
    }

    #[test]
    fn classify_transient() {
        assert_eq!(classify(&ProviderError::Timeout), ErrorClass::Transient);
        assert_eq!(classify(&ProviderError::RateLimited { retry_after_ms: 0 }), ErrorClass::Transient);
        assert_eq!(classify(&ProviderError::RequestFailed("reset".into())), ErrorClass::Transient);
        assert_eq!(classify(&status(408)), ErrorClass::Transient);
        assert_eq!(classify(&status(500)), ErrorClass::Transient);
        assert_eq!(classify(&status(503)), ErrorClass::Transient);
    }

    #[test]
    fn classify_terminal() {
        assert_eq!(classify(&ProviderError::AuthFailed("bad".into())), ErrorClass::Terminal);
        assert_eq!(classify(&ProviderError::NotConfigured("x".into())), ErrorClass::Terminal);
        assert_eq!(classify(&ProviderError::InvalidResponse("x".into())), ErrorClass::Terminal);
        assert_eq!(classify(&status(400)), ErrorClass::Terminal);
        assert_eq!(classify(&status(404)), ErrorClass::Terminal);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter_fraction: 0.0,
        };
        assert_eq!(compute_delay(&cfg, 1), Duration::from_millis(100));
        assert_eq!(compute_delay(&cfg, 2), Duration::from_millis(200));
        assert_eq!(compute_delay(&cfg, 3), Duration::from_millis(400));
        assert_eq!(compute_delay(&cfg, 4), Duration::from_millis(500));
        assert_eq!(compute_delay(&cfg, 60), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_band_and_under_cap() {
        let cfg = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(1100),
            jitter_fraction: 0.25,
        };
        for _ in 0..50 {
            let ms = compute_delay(&cfg, 1).as_millis();
            assert!(ms >= 750, "delay {ms} < 750");
            assert!(ms <= 1100, "delay {ms} > cap");
        }
    }

    #[test]
    fn rate_limit_hint_wins_but_is_capped() {
        let cfg = fast_config(3);
        let hinted = ProviderError::RateLimited { retry_after_ms: 700 };
        assert_eq!(delay_for(&cfg, 1, &hinted), Duration::from_millis(700));

        let huge = ProviderError::RateLimited { retry_after_ms: 60_000 };
        assert_eq!(delay_for(&cfg, 1, &huge), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try() {
        let policy = RetryPolicy::new("test", fast_config(3));
        let out = policy.run(|_| async { Ok::<_, ProviderError>(7) }).await.unwrap();
        assert_eq!(out, 7);
        let c = policy.counters();
        assert_eq!((c.calls, c.attempts, c.retries), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new("test", fast_config(3));
        let c = calls.clone();
        let out = policy
            .run(move |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(status(503))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(policy.counters().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reports_attempts_and_last_error() {
        let policy = RetryPolicy::new("test", fast_config(2));
        let err = policy
            .run(|_| async { Err::<(), _>(ProviderError::Timeout) })
            .await
            .unwrap_err();
        match err {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, ProviderError::Timeout));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(policy.counters().exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new("test", fast_config(5));
        let c = calls.clone();
        let err = policy
            .run(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::AuthFailed("invalid key".into())) }
            })
            .await
            .unwrap_err();
        assert!(err.is_terminal());
        assert!(matches!(err.provider_error(), ProviderError::AuthFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.counters().terminal, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let policy = RetryPolicy::new("test", fast_config(3));
        let start = tokio::time::Instant::now();
        let _ = policy.run(|_| async { Err::<(), _>(status(502)) }).await;
        // 100ms after attempt 1, 200ms after attempt 2.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_numbers_are_one_indexed() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::new("test", fast_config(3));
        let s = seen.clone();
        let _ = policy
            .run(move |attempt| {
                s.lock().unwrap().push(attempt);
                async { Err::<(), _>(ProviderError::Timeout) }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
