//! Request audit logging
//!
//! One structured line per request, emitted after the response is produced.
//! Header-derived values are sanitized before they reach the log so a
//! caller cannot forge extra log lines.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

/// Paths that are never audited
const UNAUDITED_PATHS: &[&str] = &["/healthz"];

/// Headers searched, in order, for a request correlation id
const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "x-b3-traceid", "traceparent"];

/// Make a header-derived value safe to embed in a single log line.
///
/// Surrounding whitespace and quotes are removed and line breaks escaped.
pub fn sanitize_for_log(value: &str) -> String {
    value
        .trim()
        .trim_matches('"')
        .trim()
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// First non-empty correlation id among [`REQUEST_ID_HEADERS`]
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(sanitize_for_log)
    })
}

/// Audit middleware; the state is the trusted user header name.
pub async fn audit_requests(
    State(user_header): State<HeaderName>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if UNAUDITED_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let user = request
        .headers()
        .get(&user_header)
        .and_then(|v| v.to_str().ok())
        .map(sanitize_for_log)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "-".to_string());
    let request_id = request_id(request.headers()).unwrap_or_else(|| "-".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        remote = %remote,
        user = %user,
        request_id = %request_id,
        "request"
    );

    response
}
