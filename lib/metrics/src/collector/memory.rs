use super::MetricCollector;
use crate::metric::{ByteUsage, Metric, MetricKind};
use async_trait::async_trait;
use sysinfo::System;
use tracing::instrument;

/// Reads physical memory totals from the OS. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryUsageCollector;

impl MemoryUsageCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricCollector for MemoryUsageCollector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Memory
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let mut system = System::new();
        system.refresh_memory();

        // "Free" is what the kernel can hand out without swapping, which
        // includes reclaimable page cache.
        Metric::Memory(ByteUsage::from_total_and_free(
            system.total_memory(),
            system.available_memory(),
        ))
    }
}
