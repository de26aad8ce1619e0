use crate::metric::{Metric, MetricKind};
use async_trait::async_trait;
use std::sync::Arc;

pub mod cpu;
pub mod disk;
pub mod host;
pub mod memory;
pub mod network;
pub mod process;
pub mod sensors;

pub use cpu::CpuUsageCollector;
pub use disk::DiskUsageCollector;
pub use host::HostInfoCollector;
pub use memory::MemoryUsageCollector;
pub use network::{NetworkCollector, NetworkRateState, NetworkStateRef};
pub use process::ProcessCountCollector;
pub use sensors::{CpuSpeedCollector, CpuTemperatureCollector};

/// A probe producing one category of host metric.
///
/// `collect` is infallible by contract: a failed probe yields the
/// category's fallback (zero or unknown) and is logged by the collector.
#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> MetricKind;
    async fn collect(&self) -> Metric;
}

/// A reference-counted reference to a [`MetricCollector`].
pub type MetricCollectorRef = Arc<dyn MetricCollector>;
