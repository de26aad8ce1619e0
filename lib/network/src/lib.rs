//! The streaming side of the dashboard: the snapshot publisher that drives
//! every client connection, and the HTTP server exposing it.

pub mod middleware;
pub mod publisher;
pub mod server;

pub use publisher::{Publisher, PublisherRef, Subscription};
pub use server::{start_server, DashboardServer};
