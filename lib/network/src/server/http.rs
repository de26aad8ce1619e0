use crate::middleware::{api_headers, trace::log_requests, ApiHeaders};
use crate::publisher::{Publisher, PublisherRef};
use anyhow::{Context, Result};
use axum::{
    body::StreamBody,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_macros::debug_handler;
use common::{DashboardConfig, QuickAccessApp};
use futures::{Future, StreamExt};
use metrics::{MetricSnapshot, SnapshotError, SnapshotSource};
use serde_json::json;
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, instrument, warn};
use typed_builder::TypedBuilder;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address} after {attempts} attempt(s): {source}")]
    Bind {
        address: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("Invalid allowed origin {0:?}")]
    InvalidOrigin(String),
}

/// Shared state handed to every route.
#[derive(Clone)]
struct AppState {
    publisher: PublisherRef,
    source: Arc<dyn SnapshotSource>,
    apps: Arc<Vec<QuickAccessApp>>,
}

/// HTTP front of the dashboard: the snapshot event stream plus the small
/// JSON endpoints around it.
#[derive(TypedBuilder)]
pub struct DashboardServer {
    #[builder(setter(into))]
    host: String,
    port: u16,
    #[builder(default = 5)]
    max_port_retries: u16,
    #[builder(default = Duration::from_millis(500))]
    port_retry_interval: Duration,
    #[builder(default = "*".to_string(), setter(into))]
    allowed_origin: String,
    publisher: PublisherRef,
    source: Arc<dyn SnapshotSource>,
    #[builder(default)]
    apps: Vec<QuickAccessApp>,
}

impl DashboardServer {
    pub fn from_config(config: &DashboardConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let publisher = Arc::new(Publisher::new(source.clone(), config.publish_interval()));

        DashboardServer::builder()
            .host(config.host().clone())
            .port(*config.port())
            .max_port_retries(*config.max_port_retries())
            .port_retry_interval(config.port_retry_interval())
            .allowed_origin(config.allowed_origin().clone())
            .publisher(publisher)
            .source(source)
            .apps(config.apps().clone())
            .build()
    }

    pub fn publisher(&self) -> PublisherRef {
        self.publisher.clone()
    }

    pub fn router(&self) -> Result<Router, ServerError> {
        let allow_origin = HeaderValue::from_str(&self.allowed_origin)
            .map_err(|_| ServerError::InvalidOrigin(self.allowed_origin.clone()))?;
        let api = ApiHeaders::builder().allow_origin(allow_origin).build();

        let state = AppState {
            publisher: self.publisher.clone(),
            source: self.source.clone(),
            apps: Arc::new(self.apps.clone()),
        };

        Ok(Router::new()
            .route("/api/system-info", get(system_info))
            .route("/api/snapshot", get(snapshot))
            .route("/api/apps", get(apps))
            .route("/api/health", get(health))
            .layer(middleware::from_fn_with_state(api, api_headers))
            .layer(middleware::from_fn(log_requests))
            .with_state(state))
    }

    /// Binds the configured port, walking up to `max_port_retries` ports
    /// past it while the address is taken.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let mut attempt: u32 = 0;

        loop {
            let port = self.port.saturating_add(attempt as u16);
            let address = format!("{}:{}", self.host, port);

            let error = match tokio::net::TcpListener::bind(&address).await {
                Ok(listener) => {
                    return listener.into_std().map_err(|source| ServerError::Bind {
                        address,
                        attempts: attempt + 1,
                        source,
                    })
                }
                Err(e) => e,
            };

            attempt += 1;
            if error.kind() != io::ErrorKind::AddrInUse
                || attempt > u32::from(self.max_port_retries)
            {
                return Err(ServerError::Bind {
                    address,
                    attempts: attempt,
                    source: error,
                });
            }

            warn!(
                "Port {} is in use, trying {} in {:?}",
                port,
                port.saturating_add(1),
                self.port_retry_interval
            );
            tokio::time::sleep(self.port_retry_interval).await;
        }
    }

    /// Serves on `listener` until `shutdown` resolves and every open response
    /// has finished.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let address = listener.local_addr().context("Listener has no local address")?;
        let router = self.router()?;

        info!("Dashboard listening on http://{}", address);
        axum::Server::from_tcp(listener)
            .context("Failed to adopt listener")?
            .serve(router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")?;

        info!("Dashboard server stopped");
        Ok(())
    }

    /// Binds and serves until Ctrl-C, closing every event stream first so
    /// the graceful shutdown does not wait on them.
    pub async fn run(&self) -> Result<SocketAddr> {
        let listener = self.bind().await?;
        let address = listener.local_addr().context("Listener has no local address")?;
        let publisher = self.publisher.clone();

        let shutdown = async move {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
                futures::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            let closed = publisher.close_all();
            info!(closed, "Closed streaming connections");
        };

        self.serve(listener, shutdown).await?;
        Ok(address)
    }
}

/// Failure of a one-shot API call, rendered as a JSON error body.
struct ApiError(SnapshotError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Snapshot request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Frames one serialized snapshot as a server-sent event.
pub fn event_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

#[debug_handler]
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    let events = state
        .publisher
        .subscribe()
        .into_stream()
        .map(|payload| Ok::<_, Infallible>(event_frame(&payload)));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        StreamBody::new(events),
    )
}

#[debug_handler]
async fn snapshot(State(state): State<AppState>) -> Result<Json<MetricSnapshot>, ApiError> {
    state.source.snapshot().await.map(Json).map_err(ApiError)
}

#[debug_handler]
async fn apps(State(state): State<AppState>) -> Json<Vec<QuickAccessApp>> {
    Json(state.apps.as_ref().clone())
}

#[debug_handler]
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "activeConnections": state.publisher.connection_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::apps::default_apps;
    use metrics::metric::{Metric, ProcessCount};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    const PERIOD: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing: bool,
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn snapshot(&self) -> Result<MetricSnapshot, SnapshotError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing {
                let source = tokio::spawn(async { panic!("collector blew up") })
                    .await
                    .unwrap_err();
                return Err(SnapshotError::CollectorFailed {
                    collector: "test",
                    source,
                });
            }
            Ok(MetricSnapshot::from_metrics([Metric::ProcessCount(
                ProcessCount::builder().count(call as u64).build(),
            )]))
        }
    }

    struct Running {
        address: SocketAddr,
        publisher: PublisherRef,
        stop: oneshot::Sender<()>,
    }

    async fn start(source: Arc<CountingSource>) -> Running {
        let server = DashboardServer::builder()
            .host("127.0.0.1")
            .port(0)
            .publisher(Arc::new(Publisher::new(source.clone(), PERIOD)))
            .source(source)
            .apps(default_apps())
            .build();
        let publisher = server.publisher();

        let listener = server.bind().await.unwrap();
        let address = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        Running {
            address,
            publisher,
            stop,
        }
    }

    async fn get(address: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(address).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();
        response
    }

    /// Reads from an open event stream until `events` payloads have arrived,
    /// failing if they do not within five seconds.
    async fn read_events(stream: &mut TcpStream, events: usize) -> String {
        let mut received = String::new();
        let mut buf = [0u8; 4096];
        let read_all = async {
            while received.matches("data: {").count() < events {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "stream ended early: {}", received);
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        };
        if timeout(Duration::from_secs(5), read_all).await.is_err() {
            panic!("expected {} `data: ` events, got: {}", events, received);
        }
        received
    }

    #[tokio::test]
    async fn streams_snapshots_and_stops_when_the_client_leaves() {
        let source = Arc::new(CountingSource::default());
        let running = start(source.clone()).await;

        let mut stream = TcpStream::connect(running.address).await.unwrap();
        stream
            .write_all(b"GET /api/system-info HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let received = read_events(&mut stream, 2).await;
        let head = received.to_lowercase();
        assert!(head.starts_with("http/1.1 200 ok"));
        assert!(head.contains("content-type: text/event-stream"));
        assert!(head.contains("cache-control: no-cache\r\n"));
        assert!(head.contains("access-control-allow-origin: *"));
        assert!(received.contains("data: {\""));
        assert!(received.contains("\"processCount\":1"));
        assert_eq!(running.publisher.connection_count(), 1);

        drop(stream);
        timeout(Duration::from_secs(5), async {
            while running.publisher.connection_count() > 0 {
                sleep(PERIOD).await;
            }
        })
        .await
        .expect("connection should be released after the client leaves");

        let calls = source.calls.load(Ordering::SeqCst);
        sleep(PERIOD * 5).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);

        let _ = running.stop.send(());
    }

    #[test]
    fn event_frames_put_a_space_after_the_field_name() {
        assert_eq!(event_frame(r#"{"processCount":1}"#), "data: {\"processCount\":1}\n\n");
    }

    #[tokio::test]
    async fn api_responses_carry_cache_and_robots_headers() {
        let running = start(Arc::new(CountingSource::default())).await;

        let response = get(running.address, "/api/apps").await;
        let lower = response.to_lowercase();
        assert!(lower.starts_with("http/1.1 200 ok"));
        assert!(lower.contains("cache-control: no-cache, no-store, must-revalidate"));
        assert!(lower.contains("x-robots-tag: noindex"));
        assert!(lower.contains("access-control-allow-origin: *"));
        assert!(response.contains("\"name\":\"Jellyfin\""));
        assert!(response.contains("\"iconUrl\""));

        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn health_reports_active_streams() {
        let running = start(Arc::new(CountingSource::default())).await;

        let response = get(running.address, "/api/health").await;
        assert!(response.contains(r#"{"activeConnections":0,"status":"ok"}"#)
            || response.contains(r#"{"status":"ok","activeConnections":0}"#));

        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn snapshot_endpoint_returns_one_snapshot() {
        let running = start(Arc::new(CountingSource::default())).await;

        let response = get(running.address, "/api/snapshot").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("\"processCount\":1"));
        assert!(response.contains("\"loadAverage\""));

        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn snapshot_failure_is_a_json_500() {
        let running = start(Arc::new(CountingSource {
            failing: true,
            ..Default::default()
        }))
        .await;

        let response = get(running.address, "/api/snapshot").await;
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"));
        assert!(response.contains("\"error\":\"Collector test failed to run"));

        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let running = start(Arc::new(CountingSource::default())).await;

        let mut stream = TcpStream::connect(running.address).await.unwrap();
        stream
            .write_all(b"GET /api/system-info HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        read_events(&mut stream, 1).await;

        running.publisher.close_all();
        let _ = running.stop.send(());

        let mut rest = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
            .await
            .expect("stream should end after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn walks_to_the_next_free_port() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let source = Arc::new(CountingSource::default());

        let server = DashboardServer::builder()
            .host("127.0.0.1")
            .port(port)
            .max_port_retries(3)
            .port_retry_interval(Duration::from_millis(10))
            .publisher(Arc::new(Publisher::new(source.clone(), PERIOD)))
            .source(source.clone())
            .build();
        let listener = server.bind().await.unwrap();
        assert!(listener.local_addr().unwrap().port() > port);

        let stubborn = DashboardServer::builder()
            .host("127.0.0.1")
            .port(port)
            .max_port_retries(0)
            .publisher(Arc::new(Publisher::new(source.clone(), PERIOD)))
            .source(source)
            .build();
        assert!(matches!(
            stubborn.bind().await,
            Err(ServerError::Bind { attempts: 1, .. })
        ));
    }

    #[test]
    fn rejects_unencodable_origin() {
        let source = Arc::new(CountingSource::default());
        let server = DashboardServer::builder()
            .host("127.0.0.1")
            .port(0)
            .allowed_origin("https://bad\norigin")
            .publisher(Arc::new(Publisher::new(source.clone(), PERIOD)))
            .source(source)
            .build();
        assert!(matches!(server.router(), Err(ServerError::InvalidOrigin(_))));
    }
}
