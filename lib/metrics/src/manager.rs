use crate::{
    collector::{
        CpuSpeedCollector, CpuTemperatureCollector, CpuUsageCollector, DiskUsageCollector,
        HostInfoCollector, MemoryUsageCollector, MetricCollector, MetricCollectorRef,
        NetworkCollector, NetworkRateState, NetworkStateRef, ProcessCountCollector,
    },
    command::CommandRunner,
    metric::MetricSnapshot,
};
use async_trait::async_trait;
use common::DashboardConfig;
use core::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, instrument, trace};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Collector {collector} failed to run: {source}")]
    CollectorFailed {
        collector: &'static str,
        #[source]
        source: JoinError,
    },
}

/// Anything that can produce a [`MetricSnapshot`] on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> Result<MetricSnapshot, SnapshotError>;
}

/// A reference-counted reference to a [`MetricsManager`].
pub type MetricsManagerRef = Arc<MetricsManager>;

/// Runs the registered collectors and assembles their results.
///
/// The manager owns the [`NetworkRateState`] shared by every snapshot it
/// produces, whichever connection asked for it.
pub struct MetricsManager {
    collectors: Vec<MetricCollectorRef>,
    network_state: NetworkStateRef,
}

impl fmt::Debug for MetricsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsManager")
            .field(
                "collectors",
                &self.collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MetricsManager {
    /// A manager with no collectors and a fresh network baseline.
    pub fn new() -> Self {
        Self {
            collectors: vec![],
            network_state: NetworkRateState::shared(Instant::now()),
        }
    }

    /// A manager with every host collector registered.
    pub fn from_config(config: &DashboardConfig) -> Self {
        let runner = CommandRunner::new(config.command_timeout());
        let mut manager = MetricsManager::new();
        let network_state = manager.network_state();

        manager.register_collector(
            CpuUsageCollector::builder()
                .runner(runner)
                .window(config.cpu_sample_window())
                .build(),
        );
        manager.register_collector(MemoryUsageCollector::new());
        manager.register_collector(DiskUsageCollector::builder().runner(runner).build());
        manager.register_collector(
            NetworkCollector::builder()
                .runner(runner)
                .state(network_state)
                .interface_prefixes(config.interface_prefixes().clone())
                .build(),
        );
        manager.register_collector(CpuTemperatureCollector::builder().runner(runner).build());
        manager.register_collector(CpuSpeedCollector::builder().runner(runner).build());
        manager.register_collector(ProcessCountCollector::builder().runner(runner).build());
        manager.register_collector(HostInfoCollector::new());

        manager
    }

    pub fn register_collector(&mut self, collector: impl MetricCollector + 'static) {
        trace!(collector = collector.name(), "Registering collector");
        self.collectors.push(Arc::new(collector));
    }

    pub fn network_state(&self) -> NetworkStateRef {
        self.network_state.clone()
    }

    pub fn collectors(&self) -> &[MetricCollectorRef] {
        &self.collectors
    }

    /// Starts every collector on its own task and waits for all of them.
    ///
    /// Collectors report their own fallbacks, so the only failure is a
    /// collector task that panicked. Tasks already started keep running if
    /// the returned future is dropped.
    #[instrument(skip(self))]
    pub async fn collect_snapshot(&self) -> Result<MetricSnapshot, SnapshotError> {
        let handles: Vec<_> = self
            .collectors
            .iter()
            .map(|collector| {
                let name = collector.name();
                let collector = collector.clone();
                (name, tokio::spawn(async move { collector.collect().await }))
            })
            .collect();

        let mut snapshot = MetricSnapshot::default();
        for (collector, handle) in handles {
            let metric = handle
                .await
                .map_err(|source| SnapshotError::CollectorFailed { collector, source })?;
            metric.log_metric();
            snapshot.absorb(metric);
        }

        debug!("Assembled snapshot from {} collectors", self.collectors.len());
        Ok(snapshot)
    }
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for MetricsManager {
    async fn snapshot(&self) -> Result<MetricSnapshot, SnapshotError> {
        self.collect_snapshot().await
    }
}
