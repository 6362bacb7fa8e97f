//! Pipeline request counters and latency samples.
//!
//! Counters are plain atomics; latencies live in a bounded ring of the most
//! recent [`LATENCY_SAMPLES`] messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use purse_types::health::{LatencyPercentiles, RequestCounters};

/// How many recent latencies are kept for percentiles.
pub const LATENCY_SAMPLES: usize = 1000;

/// Shared counters for one pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    candidates: AtomicU64,
    ai_categorized: AtomicU64,
    fallback_used: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
}

impl PipelineMetrics {
    /// Fresh, zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A message entered the pipeline.
    pub fn record_message(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// A message ended in an error.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Candidates were produced, split by how they were categorized.
    pub fn record_candidates(&self, ai: u64, fallback: u64) {
        self.candidates.fetch_add(ai + fallback, Ordering::Relaxed);
        self.ai_categorized.fetch_add(ai, Ordering::Relaxed);
        self.fallback_used.fetch_add(fallback, Ordering::Relaxed);
    }

    /// End-to-end latency of one message.
    pub fn record_latency(&self, elapsed: Duration) {
        let mut samples = self.latencies_ms.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    /// Current counter values.
    pub fn counters(&self) -> RequestCounters {
        RequestCounters {
            total: self.total.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            ai_categorized: self.ai_categorized.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
        }
    }

    /// p50 / p95 / p99 over the retained samples; zeros when empty.
    pub fn latency(&self) -> LatencyPercentiles {
        let mut sorted: Vec<f64> = {
            let samples = self.latencies_ms.lock().unwrap_or_else(PoisonError::into_inner);
            samples.iter().copied().collect()
        };
        if sorted.is_empty() {
            return LatencyPercentiles::default();
        }
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| {
            let idx = ((sorted.len() as f64) * q) as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        LatencyPercentiles {
            p50_ms: at(0.50),
            p95_ms: at(0.95),
            p99_ms: at(0.99),
        }
    }
}
