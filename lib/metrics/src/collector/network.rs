use super::MetricCollector;
use crate::command::{CommandRunner, ProbeError};
use crate::metric::{Metric, MetricKind, NetworkStats};
use async_trait::async_trait;
use getset::{CopyGetters, Getters};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use typed_builder::TypedBuilder;

const PROC_NET_DEV: &str = "/proc/net/dev";

/// A shared, async-locked reference to the [`NetworkRateState`].
pub type NetworkStateRef = Arc<Mutex<NetworkRateState>>;

/// Cumulative byte counters of one interface at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// The counters observed by the last successful sample; the baseline the
/// next sample's rates are computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct NetworkRateState {
    rx: u64,
    tx: u64,
    timestamp: Instant,
}

impl NetworkRateState {
    /// A zeroed baseline observed at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            rx: 0,
            tx: 0,
            timestamp: now,
        }
    }

    pub fn shared(now: Instant) -> NetworkStateRef {
        Arc::new(Mutex::new(Self::new(now)))
    }

    /// Computes per-second rates of `counters` against the stored baseline
    /// and makes `counters` the new baseline.
    ///
    /// Rates never go negative (a counter reset reads as 0 B/s) and are 0
    /// when no time has passed.
    pub fn advance(&mut self, counters: InterfaceCounters, now: Instant) -> NetworkStats {
        let elapsed = now.saturating_duration_since(self.timestamp).as_secs_f64();
        let rate = |current: u64, previous: u64| {
            if elapsed > 0.0 {
                ((current as f64 - previous as f64) / elapsed).max(0.0)
            } else {
                0.0
            }
        };

        let stats = NetworkStats::builder()
            .rx_bytes_total(counters.rx_bytes)
            .tx_bytes_total(counters.tx_bytes)
            .rx_bytes_per_sec(rate(counters.rx_bytes, self.rx))
            .tx_bytes_per_sec(rate(counters.tx_bytes, self.tx))
            .build();

        *self = Self {
            rx: counters.rx_bytes,
            tx: counters.tx_bytes,
            timestamp: now,
        };

        stats
    }
}

/// Reports throughput of the first interface matching one of the
/// configured name prefixes.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct NetworkCollector {
    runner: CommandRunner,
    state: NetworkStateRef,
    interface_prefixes: Vec<String>,
}

impl NetworkCollector {
    async fn read_counters(&self) -> Result<InterfaceCounters, ProbeError> {
        let contents = self.runner.read_file(PROC_NET_DEV).await?;
        parse_net_dev(&contents, &self.interface_prefixes).ok_or_else(|| {
            ProbeError::malformed(
                PROC_NET_DEV,
                format!("no interface matching {:?}", self.interface_prefixes),
            )
        })
    }
}

#[async_trait]
impl MetricCollector for NetworkCollector {
    fn name(&self) -> &'static str {
        "network"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Network
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        // Held across the read so concurrent samples update the baseline in order.
        let mut state = self.state.lock().await;

        match self.read_counters().await {
            Ok(counters) => {
                debug!(?counters, "Read interface counters");
                Metric::Network(state.advance(counters, Instant::now()))
            }
            Err(e) => {
                warn!(error = %e, "Failed to read network counters");
                Metric::Network(NetworkStats::default())
            }
        }
    }
}

/// Finds the first interface in `/proc/net/dev` whose name starts with one
/// of `prefixes` (loopback never matches) and returns its cumulative
/// receive (column 1) and transmit (column 9) byte counters.
pub fn parse_net_dev(contents: &str, prefixes: &[String]) -> Option<InterfaceCounters> {
    contents.lines().find_map(|line| {
        let (name, counters) = line.split_once(':')?;
        let name = name.trim();
        if name == "lo"
            || !prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
        {
            return None;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        Some(InterfaceCounters {
            rx_bytes: fields.first()?.parse().ok()?,
            tx_bytes: fields.get(8)?.parse().ok()?,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NET_DEV_SAMPLE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 8765432    4321    0    0    0     0          0         0  8765432    4321    0    0    0     0       0          0
docker0:  111111     100    0    0    0     0          0         0   222222     200    0    0    0     0       0          0
enp3s0: 123456789  98765    0    0    0     0          0       120 98765432   54321    0    0    0     0       0          0
 wlan0:    5000      50    0    0    0     0          0         0     6000      60    0    0    0     0       0          0
";

    fn default_prefixes() -> Vec<String> {
        ["eth0", "ens", "enp", "wlan"].iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn picks_first_matching_interface() {
        let counters = parse_net_dev(NET_DEV_SAMPLE, &default_prefixes()).unwrap();
        assert_eq!(
            counters,
            InterfaceCounters {
                rx_bytes: 123456789,
                tx_bytes: 98765432,
            }
        );
    }

    #[test]
    fn never_matches_loopback() {
        let prefixes = vec!["l".to_string()];
        assert_eq!(parse_net_dev(NET_DEV_SAMPLE, &prefixes), None);
    }

    #[test]
    fn no_matching_interface_is_none() {
        let prefixes = vec!["eth0".to_string()];
        assert_eq!(parse_net_dev(NET_DEV_SAMPLE, &prefixes), None);
        assert_eq!(parse_net_dev("", &default_prefixes()), None);
    }

    #[test]
    fn handles_counters_glued_to_the_name() {
        let line = "  eth0:4294967296 10 0 0 0 0 0 0 1024 5 0 0 0 0 0 0\n";
        let counters = parse_net_dev(line, &default_prefixes()).unwrap();
        assert_eq!(counters.rx_bytes, 4294967296);
        assert_eq!(counters.tx_bytes, 1024);
    }

    #[test]
    fn rates_are_deltas_over_elapsed_seconds() {
        let t0 = Instant::now();
        let mut state = NetworkRateState::new(t0);
        state.advance(
            InterfaceCounters {
                rx_bytes: 1000,
                tx_bytes: 2000,
            },
            t0,
        );

        let stats = state.advance(
            InterfaceCounters {
                rx_bytes: 1500,
                tx_bytes: 2600,
            },
            t0 + Duration::from_secs(5),
        );

        assert_eq!(stats.rx_bytes_total(), 1500);
        assert_eq!(stats.tx_bytes_total(), 2600);
        assert!((stats.rx_bytes_per_sec() - 100.0).abs() < 1e-9);
        assert!((stats.tx_bytes_per_sec() - 120.0).abs() < 1e-9);
        assert_eq!(state.rx(), 1500);
        assert_eq!(state.tx(), 2600);
        assert_eq!(state.timestamp(), t0 + Duration::from_secs(5));
    }

    #[test]
    fn counter_reset_clamps_rate_to_zero() {
        let t0 = Instant::now();
        let mut state = NetworkRateState::new(t0);
        state.advance(
            InterfaceCounters {
                rx_bytes: 10_000,
                tx_bytes: 10_000,
            },
            t0,
        );

        let stats = state.advance(
            InterfaceCounters {
                rx_bytes: 10,
                tx_bytes: 20_000,
            },
            t0 + Duration::from_secs(10),
        );

        assert_eq!(stats.rx_bytes_per_sec(), 0.0);
        assert!((stats.tx_bytes_per_sec() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn zero_elapsed_time_reports_zero_rate() {
        let t0 = Instant::now();
        let mut state = NetworkRateState::new(t0);
        let stats = state.advance(
            InterfaceCounters {
                rx_bytes: 500,
                tx_bytes: 500,
            },
            t0,
        );
        assert_eq!(stats.rx_bytes_per_sec(), 0.0);
        assert_eq!(stats.tx_bytes_per_sec(), 0.0);
    }

    #[tokio::test]
    async fn failed_sample_leaves_baseline_untouched() {
        let t0 = Instant::now();
        let state = NetworkRateState::shared(t0);
        {
            let mut guard = state.lock().await;
            guard.advance(
                InterfaceCounters {
                    rx_bytes: 1500,
                    tx_bytes: 2600,
                },
                t0,
            );
        }

        // No interface is named like this, so the sample fails.
        let collector = NetworkCollector::builder()
            .runner(CommandRunner::new(Duration::from_secs(5)))
            .state(state.clone())
            .interface_prefixes(vec!["no-such-interface".to_string()])
            .build();

        assert_eq!(
            collector.collect().await,
            Metric::Network(NetworkStats::default())
        );

        let guard = state.lock().await;
        assert_eq!(guard.rx(), 1500);
        assert_eq!(guard.tx(), 2600);
        assert_eq!(guard.timestamp(), t0);
    }

    #[test]
    fn next_success_after_failure_uses_last_good_baseline() {
        let t0 = Instant::now();
        let mut state = NetworkRateState::new(t0);
        state.advance(
            InterfaceCounters {
                rx_bytes: 1500,
                tx_bytes: 2600,
            },
            t0,
        );
        // A failed sample does not call `advance`; the following success
        // is measured against {1500, 2600}.
        let stats = state.advance(
            InterfaceCounters {
                rx_bytes: 2500,
                tx_bytes: 3600,
            },
            t0 + Duration::from_secs(10),
        );
        assert!((stats.rx_bytes_per_sec() - 100.0).abs() < 1e-9);
        assert!((stats.tx_bytes_per_sec() - 100.0).abs() < 1e-9);
    }
}
