use super::MetricCollector;
use crate::command::{CommandRunner, ProbeError};
use crate::metric::{CpuUsage, Metric, MetricKind};
use async_trait::async_trait;
use getset::Getters;
use std::time::Duration;
use tracing::{instrument, warn};
use typed_builder::TypedBuilder;

const PROC_STAT: &str = "/proc/stat";

/// Cumulative tick counters of a single core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Samples per-core tick counters twice, `window` apart, and reports the
/// busy share of all cores combined.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct CpuUsageCollector {
    runner: CommandRunner,
    window: Duration,
}

impl CpuUsageCollector {
    async fn read_times(&self) -> Result<Vec<CpuTimes>, ProbeError> {
        let contents = self.runner.read_file(PROC_STAT).await?;
        parse_proc_stat(&contents)
    }

    async fn sample(&self) -> Result<f64, ProbeError> {
        let start = self.read_times().await?;
        tokio::time::sleep(self.window).await;
        let end = self.read_times().await?;

        if start.len() != end.len() {
            return Err(ProbeError::malformed(
                PROC_STAT,
                format!("core count changed from {} to {}", start.len(), end.len()),
            ));
        }

        Ok(utilization(&start, &end))
    }
}

#[async_trait]
impl MetricCollector for CpuUsageCollector {
    fn name(&self) -> &'static str {
        "cpu-usage"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::CpuUsage
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let usage_percent = self.sample().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to sample CPU usage");
            0.0
        });

        Metric::CpuUsage(CpuUsage::builder().usage_percent(usage_percent).build())
    }
}

/// Extracts the per-core counters (`cpu0`, `cpu1`, ...) from `/proc/stat`.
///
/// Idle is the `idle` column; total is user + nice + system + idle + irq,
/// so iowait, softirq and steal time count as neither busy nor idle.
pub fn parse_proc_stat(contents: &str) -> Result<Vec<CpuTimes>, ProbeError> {
    let cores = contents
        .lines()
        .filter(|line| {
            line.strip_prefix("cpu")
                .map_or(false, |rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        })
        .map(|line| {
            parse_core_line(line)
                .ok_or_else(|| ProbeError::malformed(PROC_STAT, format!("bad core line {:?}", line)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if cores.is_empty() {
        return Err(ProbeError::malformed(PROC_STAT, "no per-core lines"));
    }

    Ok(cores)
}

fn parse_core_line(line: &str) -> Option<CpuTimes> {
    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let user = *fields.first()?;
    let nice = *fields.get(1)?;
    let system = *fields.get(2)?;
    let idle = *fields.get(3)?;
    let irq = fields.get(5).copied().unwrap_or(0);

    Some(CpuTimes {
        idle,
        total: user + nice + system + idle + irq,
    })
}

/// `100 - (Σ idle delta / Σ total delta * 100)` over all cores, clamped to
/// `[0, 100]`. Deltas are summed before dividing, not averaged per core.
/// A window with no elapsed ticks reports 0.
pub fn utilization(start: &[CpuTimes], end: &[CpuTimes]) -> f64 {
    let (idle, total) = start
        .iter()
        .zip(end)
        .fold((0.0f64, 0.0f64), |(idle, total), (before, after)| {
            (
                idle + (after.idle as f64 - before.idle as f64),
                total + (after.total as f64 - before.total as f64),
            )
        });

    if total <= 0.0 {
        return 0.0;
    }

    (100.0 - idle / total * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT_SAMPLE: &str = "\
cpu  4705 356 584 3699 23 23 0 0 0 0
cpu0 2000 100 300 1800 10 20 0 0 0 0
cpu1 2705 256 284 1899 13 3 0 0 0 0
intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]
ctxt 1990473
btime 1062191376
processes 2915
procs_running 1
procs_blocked 0
";

    fn times(idle: u64, total: u64) -> CpuTimes {
        CpuTimes { idle, total }
    }

    #[test]
    fn parses_per_core_lines_only() {
        let cores = parse_proc_stat(PROC_STAT_SAMPLE).unwrap();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0], times(1800, 2000 + 100 + 300 + 1800 + 20));
        assert_eq!(cores[1], times(1899, 2705 + 256 + 284 + 1899 + 3));
    }

    #[test]
    fn rejects_table_without_cores() {
        assert!(parse_proc_stat("cpu  1 2 3 4\nctxt 5\n").is_err());
        assert!(parse_proc_stat("").is_err());
    }

    #[test]
    fn rejects_non_numeric_core_line() {
        assert!(parse_proc_stat("cpu0 1 2 x 4\n").is_err());
    }

    #[test]
    fn aggregates_deltas_across_cores() {
        // Idle deltas 300 + 500 = 800, total deltas 400 + 600 = 1000.
        let start = [times(1000, 5000), times(2000, 9000)];
        let end = [times(1300, 5400), times(2500, 9600)];
        assert!((utilization(&start, &end) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn differs_from_per_core_average() {
        // Core 0: 0% busy over 100 ticks, core 1: 100% busy over 900 ticks.
        // Aggregate = 90%, whereas the mean of per-core figures would be 50%.
        let start = [times(0, 0), times(0, 0)];
        let end = [times(100, 100), times(0, 900)];
        assert!((utilization(&start, &end) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_adversarial_deltas() {
        // Idle advanced more than total: would be negative without the clamp.
        let start = [times(0, 0)];
        let end = [times(1500, 1000)];
        assert_eq!(utilization(&start, &end), 0.0);

        // Idle went backwards: would exceed 100 without the clamp.
        let start = [times(1000, 0)];
        let end = [times(0, 1000)];
        assert_eq!(utilization(&start, &end), 100.0);
    }

    #[test]
    fn empty_window_reports_zero() {
        let snapshot = [times(10, 20)];
        assert_eq!(utilization(&snapshot, &snapshot), 0.0);
    }

    #[tokio::test]
    async fn collects_a_bounded_percentage() {
        let collector = CpuUsageCollector::builder()
            .runner(CommandRunner::new(Duration::from_secs(1)))
            .window(Duration::from_millis(50))
            .build();

        match collector.collect().await {
            Metric::CpuUsage(usage) => {
                assert!((0.0..=100.0).contains(&usage.usage_percent()));
            }
            other => panic!("unexpected metric {:?}", other),
        }
    }
}
