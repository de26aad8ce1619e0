use axum::{
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use common::util::time::format_duration;
use std::time::Instant;
use tracing::{info, warn};

/// Logs each request with its status and handling time.
///
/// For the event stream the time covers only the response head; the
/// stream's lifespan is logged by the publisher when it closes.
pub async fn log_requests<B>(request: Request<B>, next: Next<B>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status();
    let took = format_duration(start.elapsed());

    if status.is_server_error() || status == StatusCode::NOT_FOUND {
        warn!("{} {} -> {} (took {})", method, path, status, took);
    } else {
        info!("{} {} -> {} (took {})", method, path, status, took);
    }

    response
}
