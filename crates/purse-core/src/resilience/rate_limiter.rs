//! Token-bucket rate limiting per dependency.
//!
//! Each dependency gets its own [`TokenBucket`] guarded by its own mutex, so
//! waiting on one dependency never blocks calls to another. Buckets refill
//! lazily: every acquisition first credits `elapsed * rate` tokens (capped
//! at capacity) and then tries to take one, all in the same critical
//! section.
//!
//! Time comes from [`tokio::time::Instant`], which makes the limiter
//! deterministic under `#[tokio::test(start_paused = true)]`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use purse_types::config::RateLimitConfig;
use purse_types::health::RateBudget;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CategorizeError;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_refill_wall: DateTime<Utc>,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * rate).min(capacity);
            self.last_refill = now;
            self.last_refill_wall = Utc::now();
        }
    }
}

/// A single dependency's token bucket.
pub struct TokenBucket {
    dependency: String,
    capacity: f64,
    refill_per_second: f64,
    acquire_timeout: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(dependency: impl Into<String>, config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            dependency: dependency.into(),
            capacity,
            refill_per_second: config.refill_per_second(),
            acquire_timeout: config.acquire_timeout(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                last_refill_wall: Utc::now(),
            }),
        }
    }

    /// Dependency this bucket guards.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Take one token if available.
    ///
    /// Returns `Err(wait)` with the time until the next token otherwise.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refill(self.capacity, self.refill_per_second, Instant::now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        Err(self.wait_for(1.0 - state.tokens))
    }

    /// Wait for a token, up to the configured acquire timeout.
    ///
    /// Fails immediately when the next token is further away than the
    /// remaining wait budget.
    pub async fn acquire(&self) -> Result<(), CategorizeError> {
        let deadline = Instant::now() + self.acquire_timeout;
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            if Instant::now().checked_add(wait).is_none_or(|ready| ready > deadline) {
                debug!(
                    dependency = %self.dependency,
                    wait_ms = wait.as_millis() as u64,
                    "rate limit wait exceeds budget"
                );
                return Err(CategorizeError::RateLimitExceeded {
                    dependency: self.dependency.clone(),
                    waited: self.acquire_timeout,
                });
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Snapshot of the bucket, refilled up to now.
    pub fn budget(&self) -> RateBudget {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refill(self.capacity, self.refill_per_second, Instant::now());
        RateBudget {
            dependency: self.dependency.clone(),
            capacity: self.capacity,
            refill_rate_per_second: self.refill_per_second,
            current_tokens: state.tokens,
            last_refill: state.last_refill_wall,
        }
    }

    fn wait_for(&self, missing: f64) -> Duration {
        if self.refill_per_second <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64(missing / self.refill_per_second)
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("dependency", &self.dependency)
            .field("capacity", &self.capacity)
            .field("refill_per_second", &self.refill_per_second)
            .finish()
    }
}

/// Process-wide set of token buckets, created lazily per dependency.
pub struct RateLimiterRegistry {
    config: RateLimitConfig,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry; every bucket uses `config`.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// The bucket for `dependency`, created on first use.
    pub fn bucket(&self, dependency: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(dependency) {
            return Arc::clone(&bucket);
        }
        let entry = self
            .buckets
            .entry(dependency.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(dependency, &self.config)));
        Arc::clone(&entry)
    }

    /// Wait for a token for `dependency`.
    pub async fn acquire(&self, dependency: &str) -> Result<(), CategorizeError> {
        // Clone the Arc first so no map shard lock is held across the await.
        let bucket = self.bucket(dependency);
        bucket.acquire().await
    }

    /// Take a token for `dependency` without waiting.
    pub fn try_acquire(&self, dependency: &str) -> bool {
        self.bucket(dependency).try_acquire().is_ok()
    }

    /// Snapshot of one dependency's bucket, if it exists.
    pub fn budget(&self, dependency: &str) -> Option<RateBudget> {
        self.buckets.get(dependency).map(|b| b.budget())
    }

    /// Snapshots of every bucket, sorted by dependency name.
    pub fn budgets(&self) -> Vec<RateBudget> {
        let buckets: Vec<Arc<TokenBucket>> = self.buckets.iter().map(|e| Arc::clone(e.value())).collect();
        let mut budgets: Vec<RateBudget> = buckets.iter().map(|b| b.budget()).collect();
        budgets.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        budgets
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
