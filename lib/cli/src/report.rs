use crate::SnapshotArgs;
use anyhow::{Context, Result};
use common::util::time::{format_bytes, format_uptime};
use common::QuickAccessApp;
use metrics::{metric::ByteUsage, MetricSnapshot, SnapshotSource};
use prettytable::{format::consts::FORMAT_NO_LINESEP_WITH_TITLE, row, Table};
use tracing::{info, instrument};

/// Takes one snapshot and prints it, as a table or as the raw JSON payload.
#[instrument(skip_all, fields(json = args.json()))]
pub async fn handle_snapshot_command(
    args: &SnapshotArgs,
    source: &dyn SnapshotSource,
) -> Result<()> {
    let snapshot = source
        .snapshot()
        .await
        .context("Failed to take a snapshot")?;

    if *args.json() {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?
        );
    } else {
        snapshot_table(&snapshot).printstd();
    }

    info!("Snapshot printed");
    Ok(())
}

pub fn print_apps(apps: &[QuickAccessApp]) {
    apps_table(apps).printstd();
}

pub fn snapshot_table(snapshot: &MetricSnapshot) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["Metric", "Value"]);

    let cpu = snapshot.cpu();
    table.add_row(row!["CPU", format!("{:.1}%", cpu.usage_percent())]);
    table.add_row(row!["CPU model", cpu.model()]);
    table.add_row(row!["Cores", cpu.core_count()]);
    table.add_row(row![
        "Temperature",
        cpu.temperature_c()
            .map_or_else(|| "n/a".to_string(), |c| format!("{:.1}°C", c))
    ]);
    table.add_row(row![
        "Clock speed",
        cpu.speed_ghz()
            .map_or_else(|| "n/a".to_string(), |ghz| format!("{:.2} GHz", ghz))
    ]);
    table.add_row(row!["Memory", usage_line(snapshot.memory())]);
    table.add_row(row!["Disk", usage_line(snapshot.disk())]);

    let network = snapshot.network();
    table.add_row(row![
        "Network ↓",
        format!(
            "{}/s ({} total)",
            format_bytes(network.rx_bytes_per_sec() as u64),
            format_bytes(network.rx_bytes_total())
        )
    ]);
    table.add_row(row![
        "Network ↑",
        format!(
            "{}/s ({} total)",
            format_bytes(network.tx_bytes_per_sec() as u64),
            format_bytes(network.tx_bytes_total())
        )
    ]);

    let [one, five, fifteen] = *snapshot.load_average();
    table.add_row(row![
        "Load average",
        format!("{:.2} {:.2} {:.2}", one, five, fifteen)
    ]);
    table.add_row(row!["Processes", snapshot.process_count()]);
    table.add_row(row!["Uptime", format_uptime(*snapshot.uptime_seconds())]);

    table
}

fn usage_line(usage: &ByteUsage) -> String {
    format!(
        "{} / {} ({:.1}%)",
        format_bytes(usage.used_bytes()),
        format_bytes(usage.total_bytes()),
        usage.usage_percent()
    )
}

pub fn apps_table(apps: &[QuickAccessApp]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row!["App", "URL", "Description"]);

    for app in apps {
        table.add_row(row![app.name(), app.url(), app.description()]);
    }

    table
}
