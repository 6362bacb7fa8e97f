//! Text rendering for the `/status` and `/stats` surfaces.

use std::time::Duration;

use chrono::{DateTime, Utc};
use purse_types::health::{CircuitState, DependencyHealth, HealthSnapshot, OverallStatus, StatsSnapshot};

const RULE: &str = "------------------------";

/// Uptime as `Nd Nh Nm`. Zero parts are left out, but minutes always show
/// when nothing else does.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Memory in MB below 1 GiB, GB above.
pub fn format_memory(memory_mb: Option<f64>) -> String {
    match memory_mb {
        None => "n/a".into(),
        Some(mb) if mb < 1024.0 => format!("{mb:.1} MB"),
        Some(mb) => format!("{:.2} GB", mb / 1024.0),
    }
}

fn status_marker(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Healthy => "[ok]",
        OverallStatus::Degraded => "[!]",
        OverallStatus::Unhealthy => "[x]",
    }
}

fn circuit_marker(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "[ok]",
        CircuitState::HalfOpen => "[?]",
        CircuitState::Open => "[x]",
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Time between `then` and `now`, as `Ns ago` below a minute and
/// [`format_uptime`] parts above.
pub fn format_ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let elapsed = (now - then).to_std().unwrap_or_default();
    if elapsed.as_secs() < 60 {
        format!("{}s ago", elapsed.as_secs())
    } else {
        format!("{} ago", format_uptime(elapsed))
    }
}

fn dependency_lines(snapshot: &HealthSnapshot, dep: &DependencyHealth) -> Vec<String> {
    let open_for = dep
        .open_for
        .map(|d| format!(" for {}", format_uptime(d)))
        .unwrap_or_default();
    let mut lines = vec![format!(
        "{} {}: {}{open_for} (window {} ok / {} failed, streak {})",
        circuit_marker(dep.state),
        dep.name,
        dep.state,
        dep.rolling_success,
        dep.rolling_failure,
        dep.consecutive_failures
    )];

    if let Some(avg) = dep.avg_response_ms {
        lines.push(format!("  avg response: {avg:.0} ms"));
    }
    if let Some(at) = dep.last_success {
        lines.push(format!("  last success: {}", format_ago(snapshot.taken_at, at)));
    }
    if let Some(at) = dep.last_failure {
        lines.push(format!("  last failure: {}", format_ago(snapshot.taken_at, at)));
    }
    if let Some(error) = &dep.last_error {
        lines.push(format!("  last error: {error}"));
    }
    if let Some(budget) = snapshot.rate_budgets.iter().find(|b| b.dependency == dep.name) {
        lines.push(format!(
            "  rate budget: {:.1}/{:.0} tokens, +{:.2}/s",
            budget.current_tokens, budget.capacity, budget.refill_rate_per_second
        ));
    }
    if let Some(retries) = snapshot.retries.iter().find(|r| r.name == dep.name) {
        let c = &retries.counters;
        lines.push(format!(
            "  retries: {} calls, {} retries, {} exhausted, {} terminal",
            c.calls, c.retries, c.exhausted, c.terminal
        ));
    }
    lines
}

/// Full status report.
pub fn format_status(snapshot: &HealthSnapshot) -> String {
    let req = &snapshot.requests;
    let ok = req.total.saturating_sub(req.failed);
    let cpu = snapshot
        .cpu_percent
        .map(|cpu| format!("{cpu:.1}%"))
        .unwrap_or_else(|| "n/a".into());

    let mut lines = vec![
        format!(
            "{} STATUS: {}",
            status_marker(snapshot.status),
            snapshot.status.to_string().to_uppercase()
        ),
        format!("Uptime: {}", format_uptime(snapshot.uptime)),
        format!("Taken at: {}", snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")),
        RULE.to_string(),
        "Resources".to_string(),
        format!("Memory: {}", format_memory(snapshot.memory_mb)),
        format!("CPU: {cpu}"),
        RULE.to_string(),
        "Requests".to_string(),
        format!("Messages: {}", req.total),
        format!("  ok: {ok} ({:.1}%)", percent(ok, req.total)),
        format!("  failed: {} ({:.1}%)", req.failed, percent(req.failed, req.total)),
        format!("Transactions: {}", req.candidates),
        format!("  ai: {}", req.ai_categorized),
        format!("  fallback: {} ({:.1}%)", req.fallback_used, req.fallback_ratio() * 100.0),
        RULE.to_string(),
        "External services".to_string(),
    ];

    if snapshot.dependencies.is_empty() {
        lines.push("none registered".to_string());
    }
    for dep in &snapshot.dependencies {
        lines.extend(dependency_lines(snapshot, dep));
    }

    lines.join("\n")
}

/// Short statistics report.
pub fn format_stats(stats: &StatsSnapshot) -> String {
    let req = &stats.requests;
    let lines = [
        format!("Uptime: {}", format_uptime(stats.uptime)),
        format!("Messages: {} ({} failed)", req.total, req.failed),
        format!(
            "Transactions: {} (ai {}, fallback {})",
            req.candidates, req.ai_categorized, req.fallback_used
        ),
        format!("Fallback ratio: {:.1}%", stats.fallback_ratio * 100.0),
        "Latency:".to_string(),
        format!("  p50: {:.0} ms", stats.latency.p50_ms),
        format!("  p95: {:.0} ms", stats.latency.p95_ms),
        format!("  p99: {:.0} ms", stats.latency.p99_ms),
    ];
    lines.join("\n")
}
