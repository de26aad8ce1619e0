use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

/// Represents the different kinds of metrics a collector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    CpuUsage,
    CpuTemperature,
    CpuSpeed,
    Memory,
    Disk,
    Network,
    ProcessCount,
    Host,
}

/// The result of one collector run.
/// Each variant corresponds to a different category of host metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    CpuUsage(CpuUsage),
    CpuTemperature(CpuTemperature),
    CpuSpeed(CpuSpeed),
    Memory(ByteUsage),
    Disk(ByteUsage),
    Network(NetworkStats),
    ProcessCount(ProcessCount),
    Host(HostInfo),
}

/// CPU utilization over one sampling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters, TypedBuilder)]
#[getset(get_copy = "pub")]
pub struct CpuUsage {
    /// Busy share of all cores combined (0-100%).
    usage_percent: f64,
}

/// Temperature of the first CPU core, `None` when the sensor could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters, TypedBuilder)]
#[getset(get_copy = "pub")]
pub struct CpuTemperature {
    celsius: Option<f64>,
}

/// Nominal CPU clock, `None` when it could not be determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters, TypedBuilder)]
#[getset(get_copy = "pub")]
pub struct CpuSpeed {
    ghz: Option<f64>,
}

/// Number of processes on the host. Zero doubles as the fallback when
/// the process table could not be listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters, TypedBuilder)]
#[getset(get_copy = "pub")]
pub struct ProcessCount {
    count: u64,
}

/// Static identity and slow-moving counters of the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct HostInfo {
    #[builder(setter(into))]
    model: String,
    core_count: usize,
    uptime_seconds: u64,
    /// 1, 5 and 15 minute load averages.
    load_average: [f64; 3],
}

/// Capacity of a byte-sized resource (physical memory, a filesystem).
///
/// `used_bytes + free_bytes == total_bytes` always holds; the all-zero
/// default is the fallback for a failed probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters)]
#[serde(rename_all = "camelCase")]
#[getset(get_copy = "pub")]
pub struct ByteUsage {
    total_bytes: u64,
    used_bytes: u64,
    free_bytes: u64,
    usage_percent: f64,
}

impl ByteUsage {
    /// Builds usage from a total and the amount still available; the
    /// percentage is derived.
    pub fn from_total_and_free(total_bytes: u64, free_bytes: u64) -> Self {
        let free_bytes = free_bytes.min(total_bytes);
        let used_bytes = total_bytes - free_bytes;
        let usage_percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };

        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            usage_percent,
        }
    }

    /// Builds usage from a total, the used amount and a percentage reported
    /// alongside them (e.g. by `df`, which accounts for reserved blocks).
    pub fn from_total_and_used(total_bytes: u64, used_bytes: u64, usage_percent: f64) -> Self {
        let used_bytes = used_bytes.min(total_bytes);

        Self {
            total_bytes,
            used_bytes,
            free_bytes: total_bytes - used_bytes,
            usage_percent,
        }
    }
}

/// Cumulative interface counters and the per-second rates derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, CopyGetters, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[getset(get_copy = "pub")]
pub struct NetworkStats {
    rx_bytes_total: u64,
    tx_bytes_total: u64,
    rx_bytes_per_sec: f64,
    tx_bytes_per_sec: f64,
}

/// The `cpu` section of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub")]
pub struct CpuSnapshot {
    usage_percent: f64,
    core_count: usize,
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature_c: Option<f64>,
    #[serde(rename = "speedGHz", default, skip_serializing_if = "Option::is_none")]
    speed_ghz: Option<f64>,
}

/// Everything the dashboard shows for one tick. Serialized as the payload
/// of each stream event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub")]
pub struct MetricSnapshot {
    cpu: CpuSnapshot,
    memory: ByteUsage,
    disk: ByteUsage,
    network: NetworkStats,
    uptime_seconds: u64,
    load_average: [f64; 3],
    process_count: u64,
}

impl MetricSnapshot {
    /// Assembles a snapshot from collector results. Categories that are
    /// missing keep their fallback values.
    pub fn from_metrics(metrics: impl IntoIterator<Item = Metric>) -> Self {
        let mut snapshot = Self::default();
        for metric in metrics {
            snapshot.absorb(metric);
        }
        snapshot
    }

    pub fn absorb(&mut self, metric: Metric) {
        match metric {
            Metric::CpuUsage(data) => self.cpu.usage_percent = data.usage_percent,
            Metric::CpuTemperature(data) => self.cpu.temperature_c = data.celsius,
            Metric::CpuSpeed(data) => self.cpu.speed_ghz = data.ghz,
            Metric::Memory(data) => self.memory = data,
            Metric::Disk(data) => self.disk = data,
            Metric::Network(data) => self.network = data,
            Metric::ProcessCount(data) => self.process_count = data.count,
            Metric::Host(data) => {
                self.cpu.model = data.model;
                self.cpu.core_count = data.core_count;
                self.uptime_seconds = data.uptime_seconds;
                self.load_average = data.load_average;
            }
        }
    }
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::CpuUsage(_) => MetricKind::CpuUsage,
            Metric::CpuTemperature(_) => MetricKind::CpuTemperature,
            Metric::CpuSpeed(_) => MetricKind::CpuSpeed,
            Metric::Memory(_) => MetricKind::Memory,
            Metric::Disk(_) => MetricKind::Disk,
            Metric::Network(_) => MetricKind::Network,
            Metric::ProcessCount(_) => MetricKind::ProcessCount,
            Metric::Host(_) => MetricKind::Host,
        }
    }

    pub fn log_metric(&self) {
        match self {
            Metric::CpuUsage(data) => debug!("CPU Usage: {:.1}%", data.usage_percent),
            Metric::CpuTemperature(data) => match data.celsius {
                Some(celsius) => debug!("CPU Temperature: {:.1}°C", celsius),
                None => debug!("CPU Temperature: unknown"),
            },
            Metric::CpuSpeed(data) => match data.ghz {
                Some(ghz) => debug!("CPU Speed: {:.2} GHz", ghz),
                None => debug!("CPU Speed: unknown"),
            },
            Metric::Memory(data) => debug!(
                "Memory - Used: {} bytes, Total: {} bytes ({:.1}%)",
                data.used_bytes, data.total_bytes, data.usage_percent
            ),
            Metric::Disk(data) => debug!(
                "Disk - Used: {} bytes, Total: {} bytes ({:.1}%)",
                data.used_bytes, data.total_bytes, data.usage_percent
            ),
            Metric::Network(data) => debug!(
                "Network - Received: {:.0} B/s, Sent: {:.0} B/s",
                data.rx_bytes_per_sec, data.tx_bytes_per_sec
            ),
            Metric::ProcessCount(data) => debug!("Processes: {}", data.count),
            Metric::Host(data) => debug!(
                "Host - {} x{}, up {}s, load {:?}",
                data.model, data.core_count, data.uptime_seconds, data.load_average
            ),
        }
    }
}
