use anyhow::{Context, Result};
use clap::Parser;
use cli::report::{handle_snapshot_command, print_apps};
use cli::{Cli, Commands};
use common::util::trace::initialize_tracing;
use common::DashboardConfig;
use metrics::MetricsManager;
use network::server::start_server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Before tracing, so RUST_LOG from .env applies.
    dotenv::dotenv().ok();

    let args = Cli::parse();
    initialize_tracing(*args.verbose()).context("Failed to initialize tracing")?;
    info!("homedash CLI started");

    let config_path = args
        .config()
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());
    let config =
        DashboardConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    match args.command() {
        Commands::Serve(serve_args) => {
            start_server(serve_args, config).await?;
        }
        Commands::Snapshot(snapshot_args) => {
            let manager = MetricsManager::from_config(&config);
            handle_snapshot_command(snapshot_args, &manager).await?;
        }
        Commands::Apps => {
            print_apps(config.apps());
        }
    }

    Ok(())
}
