//! # purse-core
//!
//! The message pipeline and everything it needs to stay responsive when the
//! AI categorization service is slow, failing or unreachable.
//!
//! - [`extract`] -- free text to transaction candidates
//! - [`classifier`] -- keyword fallback categorization
//! - [`resilience`] -- token buckets and circuit breakers per dependency
//! - [`categorizer`] -- the AI client wrapped in the resilience shell
//! - [`throttle`] -- per-user message throttle
//! - [`metrics`] -- request counters and latency percentiles
//! - [`pipeline`] -- the orchestrator and the pending-batch contract

pub mod categorizer;
pub mod classifier;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod pipeline;
pub mod resilience;
pub mod throttle;

pub use categorizer::{AI_DEPENDENCY, AiCategorization, AiCategorizer, AiOutcome, UnavailableReason};
pub use classifier::{Classification, FallbackClassifier, classify};
pub use error::{CategorizeError, PipelineError};
pub use extract::{extract, parse_amount};
pub use metrics::PipelineMetrics;
pub use pipeline::{CandidateEdit, PendingBatch, TransactionPipeline};
pub use resilience::{CallPermit, CircuitBreaker, CircuitBreakerRegistry, RateLimiterRegistry, Resilience, TokenBucket};
pub use throttle::MessageThrottle;
