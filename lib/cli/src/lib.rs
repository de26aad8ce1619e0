use clap::{Args, Parser, Subcommand};
use getset::Getters;
use std::path::PathBuf;

pub mod report;

/// homedash: host metrics for your home server dashboard
#[derive(Debug, Parser, Getters)]
#[command(name = "homedash")]
#[command(about = "homedash: Live host metrics for a self-hosted dashboard", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    #[getset(get = "pub")]
    command: Commands,
    /// Path to a TOML config file (defaults to ./homedash.toml if present)
    #[arg(short, long, global = true)]
    #[getset(get = "pub")]
    config: Option<PathBuf>,
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    #[getset(get = "pub")]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the dashboard server and stream metrics to connected browsers
    Serve(ServeArgs),
    /// Take a single snapshot of the host and print it
    Snapshot(SnapshotArgs),
    /// List the quick access apps shown on the dashboard
    Apps,
}

#[derive(Debug, Default, Args, Getters)]
#[getset(get = "pub")]
pub struct ServeArgs {
    /// Port to host the server on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
    /// Address to bind (overrides the config file)
    #[arg(short = 'a', long)]
    host: Option<String>,
}

#[derive(Debug, Default, Args, Getters)]
#[getset(get = "pub")]
pub struct SnapshotArgs {
    /// Print the snapshot as the JSON sent to the dashboard
    #[arg(short, long)]
    json: bool,
}
