pub mod http;

use anyhow::Result;
use cli::ServeArgs;
use common::DashboardConfig;
use get_if_addrs::get_if_addrs;
use metrics::MetricsManager;
use std::sync::Arc;
use tracing::{info, warn};

pub use http::{DashboardServer, ServerError};

pub async fn start_server(args: &ServeArgs, mut config: DashboardConfig) -> Result<()> {
    if let Some(port) = args.port() {
        config.set_port(*port);
    }
    if let Some(host) = args.host() {
        config.set_host(host.clone());
    }
    info!(
        host = %config.host(),
        port = config.port(),
        period = ?config.publish_interval(),
        "Starting dashboard server"
    );

    match get_public_ip() {
        Some(public_ip) => info!(public_ip = ?public_ip, "Listening at IP address"),
        None => warn!("No non-loopback interface address found"),
    }

    let source = Arc::new(MetricsManager::from_config(&config));
    let server = DashboardServer::from_config(&config, source);
    let address = server.run().await?;

    info!("Server on {} shut down cleanly", address);
    Ok(())
}

fn get_public_ip() -> Option<String> {
    let if_addrs = get_if_addrs().ok()?;

    if_addrs
        .iter()
        .filter(|if_addr| !if_addr.is_loopback())
        .map(|if_addr| if_addr.ip().to_string())
        .next()
}
