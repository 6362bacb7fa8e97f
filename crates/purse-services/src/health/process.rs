//! Process resource sampling from procfs.
//!
//! Only Linux exposes `/proc/self`; elsewhere every reading is `None` and
//! the health surface prints "n/a".

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Kernel clock ticks per second. Fixed at 100 on every mainstream Linux
/// target.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// One resource reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessSample {
    /// Resident set size in MiB.
    pub memory_mb: Option<f64>,
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu_percent: Option<f64>,
}

/// Reads RSS and CPU time for the current process.
///
/// CPU usage is a delta, so the sampler keeps the previous reading. The
/// baseline is taken at construction.
#[derive(Debug)]
pub struct ProcessSampler {
    proc_dir: PathBuf,
    previous: Mutex<Option<(Instant, u64)>>,
}

impl ProcessSampler {
    /// Sample `/proc/self`.
    pub fn new() -> Self {
        Self::with_proc_dir("/proc/self")
    }

    /// Sample a different procfs directory.
    pub fn with_proc_dir(dir: impl Into<PathBuf>) -> Self {
        let proc_dir = dir.into();
        let baseline = read_cpu_ticks(&proc_dir).map(|ticks| (Instant::now(), ticks));
        Self {
            proc_dir,
            previous: Mutex::new(baseline),
        }
    }

    /// Take a reading and move the CPU baseline forward.
    pub fn sample(&self) -> ProcessSample {
        let memory_mb = std::fs::read_to_string(self.proc_dir.join("status"))
            .ok()
            .and_then(|s| parse_status_rss_kb(&s))
            .map(|kb| kb as f64 / 1024.0);

        let cpu_percent = read_cpu_ticks(&self.proc_dir).and_then(|ticks| {
            let now = Instant::now();
            let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
            let percent = (*previous).and_then(|(then, before)| cpu_percent(before, ticks, now.duration_since(then).as_secs_f64()));
            *previous = Some((now, ticks));
            percent
        });

        ProcessSample {
            memory_mb,
            cpu_percent,
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn read_cpu_ticks(proc_dir: &Path) -> Option<u64> {
    let stat = std::fs::read_to_string(proc_dir.join("stat")).ok()?;
    parse_stat_cpu_ticks(&stat)
}

fn cpu_percent(before: u64, after: u64, elapsed_secs: f64) -> Option<f64> {
    if elapsed_secs <= 0.0 {
        return None;
    }
    let used = after.saturating_sub(before) as f64 / CLOCK_TICKS_PER_SEC;
    Some(used / elapsed_secs * 100.0)
}

/// Extract the `VmRSS` value in kB from `/proc/<pid>/status`.
pub fn parse_status_rss_kb(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

/// Sum of `utime` and `stime` in clock ticks from `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_stat_cpu_ticks(contents: &str) -> Option<u64> {
    let (_, rest) = contents.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "1234 (purse (cli) x) S 1 1234 1234 0 -1 4194560 2500 0 0 0 150 50 0 0 20 0 8 0 100 200000000 5000 18446744073709551615";

    #[test]
    fn parses_rss() {
        assert_eq!(parse_status_rss_kb("Name:\tpurse\nVmRSS:\t  20480 kB\nThreads:\t8\n"), Some(20480));
        assert_eq!(parse_status_rss_kb("Name:\tpurse\n"), None);
        assert_eq!(parse_status_rss_kb("VmRSS:\n"), None);
    }

    #[test]
    fn parses_cpu_ticks_after_command_name() {
        assert_eq!(parse_stat_cpu_ticks(STAT), Some(200));
    }

    #[test]
    fn truncated_stat_is_none() {
        assert_eq!(parse_stat_cpu_ticks("1234 (purse) S 1 2 3"), None);
        assert_eq!(parse_stat_cpu_ticks("garbage"), None);
    }

    #[test]
    fn cpu_percent_from_tick_delta() {
        // 50 ticks over one second is half a core.
        let pct = cpu_percent(100, 150, 1.0).unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(cpu_percent(100, 150, 0.0), None);
        assert_eq!(cpu_percent(150, 100, 1.0), Some(0.0));
    }

    #[test]
    fn reads_fixture_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("status"), "VmRSS:\t2048 kB\n").unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();

        let sampler = ProcessSampler::with_proc_dir(dir.path());
        let sample = sampler.sample();
        assert_eq!(sample.memory_mb, Some(2.0));
        assert!(sample.cpu_percent.is_none_or(|cpu| cpu >= 0.0));
    }

    #[test]
    fn missing_procfs_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = ProcessSampler::with_proc_dir(dir.path().join("nope"));
        assert_eq!(sampler.sample(), ProcessSample::default());
    }
}
