//! HTTP middleware for registry-admission
//!
//! - Request/response logging
//! - OpenTelemetry request spans

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logging middleware function
///
/// Logs method, path, status and response time. Client and server errors are
/// logged at warn level.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %uri.path(),
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed with error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %uri.path(),
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Tracing middleware function
///
/// Wraps the whole request lifecycle in an `http_request` span so stage logs
/// are correlated with the request that caused them.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.url = %uri,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
