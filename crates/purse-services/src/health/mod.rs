//! Health monitor.
//!
//! Aggregates circuit breakers, rate budgets, retry counters, pipeline
//! metrics and a process sample into a [`HealthSnapshot`]. The monitor only
//! reads; it never changes breaker or limiter state.

pub mod format;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use purse_core::{AI_DEPENDENCY, AiCategorizer, PipelineMetrics, Resilience};
use purse_types::config::HealthConfig;
use purse_types::health::{CircuitState, HealthSnapshot, OverallStatus, StatsSnapshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use format::{format_ago, format_memory, format_stats, format_status, format_uptime};
pub use process::{ProcessSample, ProcessSampler};

/// Periodic health reporter for one process.
pub struct HealthMonitor {
    config: HealthConfig,
    resilience: Resilience,
    metrics: Arc<PipelineMetrics>,
    categorizer: Option<AiCategorizer>,
    sampler: ProcessSampler,
    started: Instant,
}

impl HealthMonitor {
    /// Create a monitor over shared resilience state and pipeline metrics.
    pub fn new(config: HealthConfig, resilience: Resilience, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            config,
            resilience,
            metrics,
            categorizer: None,
            sampler: ProcessSampler::new(),
            started: Instant::now(),
        }
    }

    /// Report on the AI categorizer too.
    ///
    /// Its breaker is registered up front so a fresh process already shows
    /// the dependency as closed.
    pub fn with_categorizer(mut self, categorizer: AiCategorizer) -> Self {
        self.resilience.breakers.breaker(AI_DEPENDENCY);
        self.categorizer = Some(categorizer);
        self
    }

    /// Replace the process sampler (e.g. with a fixture directory).
    pub fn with_sampler(mut self, sampler: ProcessSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Time since the monitor was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Full snapshot, sampling the process now.
    pub fn snapshot(&self) -> HealthSnapshot {
        let dependencies = self.resilience.breakers.snapshots();
        let sample = self.sampler.sample();
        HealthSnapshot {
            taken_at: Utc::now(),
            uptime: self.uptime(),
            memory_mb: sample.memory_mb,
            cpu_percent: sample.cpu_percent,
            status: OverallStatus::from_dependencies(&dependencies),
            dependencies,
            rate_budgets: self.resilience.limiter.budgets(),
            retries: self.categorizer.iter().map(AiCategorizer::retry_counters).collect(),
            requests: self.metrics.counters(),
        }
    }

    /// The lighter stats view.
    pub fn stats(&self) -> StatsSnapshot {
        let requests = self.metrics.counters();
        StatsSnapshot {
            uptime: self.uptime(),
            requests,
            fallback_ratio: requests.fallback_ratio(),
            latency: self.metrics.latency(),
        }
    }

    /// Conditions in `snapshot` worth a warning.
    pub fn alerts(&self, snapshot: &HealthSnapshot) -> Vec<String> {
        let open_limit = Duration::from_secs(self.config.open_alert_secs);
        let mut alerts: Vec<String> = snapshot
            .dependencies
            .iter()
            .filter(|d| d.state == CircuitState::Open)
            .filter_map(|d| {
                let open_for = d.open_for?;
                (open_for > open_limit).then(|| {
                    format!("{} circuit open for {}s", d.name, open_for.as_secs())
                })
            })
            .collect();

        if let Some(mb) = snapshot.memory_mb
            && mb > self.config.memory_warn_mb as f64
        {
            alerts.push(format!(
                "resident memory {mb:.1} MB above {} MB",
                self.config.memory_warn_mb
            ));
        }
        alerts
    }

    /// Log a snapshot every `interval_secs` until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        self.run_with(cancel, |_| {}).await;
    }

    /// Like [`run`](Self::run), handing each snapshot to `on_report` after
    /// it is logged.
    pub async fn run_with<F>(&self, cancel: CancellationToken, mut on_report: F)
    where
        F: FnMut(&HealthSnapshot),
    {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        info!(interval_secs = period.as_secs(), "health monitor started");
        let mut interval = tokio::time::interval(period);

        // The first tick fires immediately; skip it so the first report
        // happens after one full interval.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("health monitor shutting down");
                    return;
                }
                _ = interval.tick() => {
                    let snapshot = self.snapshot();
                    self.report(&snapshot);
                    on_report(&snapshot);
                }
            }
        }
    }

    fn report(&self, snapshot: &HealthSnapshot) {
        let req = &snapshot.requests;
        info!(
            status = %snapshot.status,
            uptime_secs = snapshot.uptime.as_secs(),
            memory_mb = snapshot.memory_mb.unwrap_or_default(),
            messages = req.total,
            failed = req.failed,
            fallback_ratio = req.fallback_ratio(),
            "health report"
        );
        for dep in &snapshot.dependencies {
            if dep.state != CircuitState::Closed {
                warn!(
                    dependency = %dep.name,
                    state = %dep.state,
                    consecutive_failures = dep.consecutive_failures,
                    "dependency impaired"
                );
            }
        }
        for alert in self.alerts(snapshot) {
            warn!(alert = %alert, "health alert");
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("categorizer", &self.categorizer)
            .field("started", &self.started)
            .finish()
    }
}
