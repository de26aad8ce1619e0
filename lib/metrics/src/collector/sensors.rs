use super::MetricCollector;
use crate::command::{CommandRunner, ProbeError};
use crate::metric::{CpuSpeed, CpuTemperature, Metric, MetricKind};
use async_trait::async_trait;
use getset::Getters;
use tracing::{debug, instrument};
use typed_builder::TypedBuilder;

/// Reads the first core's temperature from lm-sensors. Unknown (not zero)
/// when `sensors` is missing or prints no `Core 0` reading.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct CpuTemperatureCollector {
    runner: CommandRunner,
}

impl CpuTemperatureCollector {
    async fn sample(&self) -> Result<f64, ProbeError> {
        let output = self.runner.run("sensors", &[]).await?;
        parse_core_temperature(&output)
            .ok_or_else(|| ProbeError::malformed("sensors", "no Core 0 reading"))
    }
}

#[async_trait]
impl MetricCollector for CpuTemperatureCollector {
    fn name(&self) -> &'static str {
        "cpu-temperature"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::CpuTemperature
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let celsius = self
            .sample()
            .await
            .map_err(|e| debug!(error = %e, "CPU temperature unavailable"))
            .ok();

        Metric::CpuTemperature(CpuTemperature::builder().celsius(celsius).build())
    }
}

/// Reads the nominal clock from `lscpu`. Unknown when `lscpu` is missing or
/// does not report `CPU MHz`.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct CpuSpeedCollector {
    runner: CommandRunner,
}

impl CpuSpeedCollector {
    async fn sample(&self) -> Result<f64, ProbeError> {
        let output = self.runner.run("lscpu", &[]).await?;
        parse_cpu_mhz(&output)
            .map(|mhz| mhz / 1000.0)
            .ok_or_else(|| ProbeError::malformed("lscpu", "no CPU MHz line"))
    }
}

#[async_trait]
impl MetricCollector for CpuSpeedCollector {
    fn name(&self) -> &'static str {
        "cpu-speed"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::CpuSpeed
    }

    #[instrument(skip(self))]
    async fn collect(&self) -> Metric {
        let ghz = self
            .sample()
            .await
            .map_err(|e| debug!(error = %e, "CPU speed unavailable"))
            .ok();

        Metric::CpuSpeed(CpuSpeed::builder().ghz(ghz).build())
    }
}

/// `Core 0:        +45.0°C  (high = +80.0°C, crit = +100.0°C)` -> `45.0`.
pub fn parse_core_temperature(output: &str) -> Option<f64> {
    let line = output.lines().find(|line| line.contains("Core 0"))?;
    let reading = line.split_whitespace().nth(2)?;
    let value = reading.trim_start_matches('+').trim_end_matches("°C");
    parse_finite(value)
}

/// `CPU MHz:             2400.000` -> `2400.0`.
pub fn parse_cpu_mhz(output: &str) -> Option<f64> {
    let line = output.lines().find(|line| line.contains("CPU MHz"))?;
    let value = line.split_whitespace().nth(2)?;
    parse_finite(value)
}

fn parse_finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
