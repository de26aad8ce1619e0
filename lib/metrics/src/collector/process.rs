use super::MetricCollector;
use crate::command::{CommandRunner, ProbeError};
use crate::metric::{Metric, MetricKind, ProcessCount};
use async_trait::async_trait;
use getset::Getters;
use tracing::{instrument, warn};
use typed_builder::TypedBuilder;

/// Counts processes listed by `ps`. Falls back to zero, not unknown.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct ProcessCountCollector {
    runner: CommandRunner,
}

impl ProcessCountCollector {
    async fn sample(&self) -> Result<u64, ProbeError> {
        let output = self.runner.run("ps", &["aux"]).await?;
        Ok(count_processes(&output))
    }
}

#[async_trait]
impl MetricCollector for ProcessCountCollector {
    fn name(&self) -> &'static str {
        "process-count"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::ProcessCount
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let count = self.sample().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to count processes");
            0
        });

        Metric::ProcessCount(ProcessCount::builder().count(count).build())
    }
}

/// Number of lines minus the header line.
pub fn count_processes(output: &str) -> u64 {
    (output.lines().count() as u64).saturating_sub(1)
}
