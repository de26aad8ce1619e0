use axum::{
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use typed_builder::TypedBuilder;

pub mod trace;

/// Sent on every `/api` response whose handler did not pick its own policy.
pub const API_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
pub const X_ROBOTS_TAG: &str = "x-robots-tag";

/// Header values shared by every `/api` response.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ApiHeaders {
    allow_origin: HeaderValue,
}

/// Adds caching, indexing and CORS headers to API responses.
///
/// A `Cache-Control` set by the handler (the event stream sets `no-cache`)
/// is left alone.
pub async fn api_headers<B>(
    State(api): State<ApiHeaders>,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static(API_CACHE_CONTROL));
    headers.insert(X_ROBOTS_TAG, HeaderValue::from_static("noindex"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, api.allow_origin);

    response
}
