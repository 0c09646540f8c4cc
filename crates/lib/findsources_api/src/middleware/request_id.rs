//! Request correlation ids and per-request tracing spans.
//!
//! Each request gets an `x-request-id` (kept if the client sent one), echoed
//! on the response. The trace layer opens a span carrying the id, so every
//! log line emitted while handling the request is tagged with it.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderName, HeaderValue, Request, Response};
use tower::ServiceBuilder;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::set_header::SetRequestHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, info, info_span};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wrap `router` with request-id generation, propagation and tracing.
pub fn with_observability(router: Router) -> Router {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(header.clone(), |_req: &Request<Body>| {
                HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok()
            }))
            .layer(PropagateRequestIdLayer::new(header))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(make_span)
                    .on_response(on_response),
            ),
    )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path());
    info_span!("http.request", method = %request.method(), route, request_id)
}

fn on_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        "request took {} ms",
        latency.as_millis()
    );
}
