//! Protective shell around external dependencies.
//!
//! - [`rate_limiter`] -- token bucket per dependency
//! - [`circuit_breaker`] -- closed / open / half-open gate per dependency
//!
//! Retries live in `purse_llm::retry` next to the providers they wrap.

pub mod circuit_breaker;
pub mod rate_limiter;

use std::sync::Arc;

use purse_llm::RetryConfig;
use purse_types::config::ResilienceConfig;

pub use circuit_breaker::{Admission, CallPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitEvent};
pub use rate_limiter::{RateLimiterRegistry, TokenBucket};

/// Shared resilience state for one process.
///
/// Cloning is cheap and every clone sees the same registries, which is how
/// the categorizer and the health monitor observe the same breakers.
#[derive(Clone)]
pub struct Resilience {
    /// Token buckets keyed by dependency.
    pub limiter: Arc<RateLimiterRegistry>,
    /// Circuit breakers keyed by dependency.
    pub breakers: Arc<CircuitBreakerRegistry>,
    /// Retry settings for new retry policies.
    pub retry: RetryConfig,
}

impl Resilience {
    /// Build empty registries from config.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiterRegistry::new(config.rate_limit.clone())),
            breakers: Arc::new(CircuitBreakerRegistry::new(config.circuit.clone())),
            retry: RetryConfig::from(&config.retry),
        }
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}
