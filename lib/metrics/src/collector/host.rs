use super::MetricCollector;
use crate::metric::{HostInfo, Metric, MetricKind};
use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::instrument;

/// CPU identity, core count, uptime and load average. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInfoCollector;

impl HostInfoCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricCollector for HostInfoCollector {
    fn name(&self) -> &'static str {
        "host"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Host
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        let cpus = system.cpus();

        let model = cpus
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let load = System::load_average();

        Metric::Host(
            HostInfo::builder()
                .model(model)
                .core_count(cpus.len())
                .uptime_seconds(System::uptime())
                .load_average([load.one, load.five, load.fifteen])
                .build(),
        )
    }
}
