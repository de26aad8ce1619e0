//! Host metric sampling.
//!
//! Each [`collector::MetricCollector`] produces one category of metric and
//! never fails: probe errors are logged and mapped to that category's
//! fallback. The [`manager::MetricsManager`] runs all collectors concurrently
//! and folds their results into a [`metric::MetricSnapshot`].

pub mod collector;
pub mod command;
pub mod manager;
pub mod metric;

pub use command::{CommandRunner, ProbeError};
pub use manager::{MetricsManager, MetricsManagerRef, SnapshotError, SnapshotSource};
pub use metric::{Metric, MetricKind, MetricSnapshot};
