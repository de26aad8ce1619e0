//! Shared building blocks for the dashboard: configuration, the quick-access
//! app catalog, tracing setup and formatting helpers.

pub mod apps;
pub mod config;
pub mod util;

pub use apps::QuickAccessApp;
pub use config::{DashboardConfig, DashboardConfigError};

/// Default port the dashboard server listens on.
pub const DEFAULT_PORT: u16 = 8000;

/// Default address the dashboard server binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Prefix for environment variables overriding configuration values,
/// e.g. `DASHBOARD__PORT=9000`.
pub const ENV_PREFIX: &str = "DASHBOARD";

/// Configuration file picked up from the working directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "homedash.toml";
