use super::MetricCollector;
use crate::command::{CommandRunner, ProbeError};
use crate::metric::{ByteUsage, Metric, MetricKind};
use async_trait::async_trait;
use getset::Getters;
use tracing::{instrument, warn};
use typed_builder::TypedBuilder;

/// Reports usage of the root filesystem as printed by `df`.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct DiskUsageCollector {
    runner: CommandRunner,
    #[builder(default = "/".to_string(), setter(into))]
    mount_point: String,
}

impl DiskUsageCollector {
    async fn sample(&self) -> Result<ByteUsage, ProbeError> {
        let output = self
            .runner
            .run("df", &["-P", "-h", self.mount_point.as_str()])
            .await?;
        parse_df(&output)
    }
}

#[async_trait]
impl MetricCollector for DiskUsageCollector {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Disk
    }

    #[instrument(skip(self), fields(mount_point = %self.mount_point))]
    async fn collect(&self) -> Metric {
        let usage = self.sample().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read disk usage");
            ByteUsage::default()
        });

        Metric::Disk(usage)
    }
}

/// Parses the last row of `df -P -h`:
/// `Filesystem Size Used Avail Capacity Mounted-on`.
pub fn parse_df(output: &str) -> Result<ByteUsage, ProbeError> {
    let row = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .last()
        .ok_or_else(|| ProbeError::malformed("df", "empty output"))?;

    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(ProbeError::malformed(
            "df",
            format!("expected 6 columns, got {:?}", row),
        ));
    }

    let total = parse_size(fields[1])
        .ok_or_else(|| ProbeError::malformed("df", format!("bad size {:?}", fields[1])))?;
    let used = parse_size(fields[2])
        .ok_or_else(|| ProbeError::malformed("df", format!("bad used {:?}", fields[2])))?;
    let usage_percent = fields[4]
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|percent| percent.is_finite())
        .ok_or_else(|| ProbeError::malformed("df", format!("bad capacity {:?}", fields[4])))?;

    Ok(ByteUsage::from_total_and_used(total, used, usage_percent))
}

/// Parses a human-readable size with at most one binary unit suffix
/// (`512`, `976M`, `1.5G`, `2T`).
pub fn parse_size(field: &str) -> Option<u64> {
    let (number, multiplier) = match field.chars().last()? {
        unit if unit.is_ascii_alphabetic() => {
            let number = &field[..field.len() - unit.len_utf8()];
            (number, unit_multiplier(unit)?)
        }
        _ => (field, 1),
    };

    let value = number.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    Some((value * multiplier as f64).round() as u64)
}

fn unit_multiplier(unit: char) -> Option<u64> {
    let shift = match unit.to_ascii_uppercase() {
        'B' => 0,
        'K' => 10,
        'M' => 20,
        'G' => 30,
        'T' => 40,
        'P' => 50,
        'E' => 60,
        _ => return None,
    };
    Some(1u64 << shift)
}
