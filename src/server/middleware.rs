//! Rate limiting middleware for the HTTP API.
//!
//! Keys every request by client address and answers `429 Too Many Requests`
//! with a `Retry-After` hint once the client's quota is spent.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        header::{HeaderName, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::debug;

use super::AppState;
use crate::rate_limit::{Clock, Decision};

/// Header announcing the per-window limit on admitted responses
pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";

const REAL_IP_HEADER: &str = "x-real-ip";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Key used when no client address can be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the rate-limit key for a request.
///
/// With `trust_proxy_headers` the order is `X-Real-IP`, first
/// `X-Forwarded-For` entry, peer address. Without it the headers are ignored
/// and only the peer address counts, since any client can set them.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(key) = proxy_header_key(headers) {
            return key;
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn proxy_header_key(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(real_ip) = header(REAL_IP_HEADER) {
        return Some(real_ip.to_string());
    }

    header(FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Admit or reject the request before it reaches any handler
pub async fn rate_limit_middleware<C: Clock>(
    State(state): State<AppState<C>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, state.trust_proxy_headers);

    match state.controller.check(&key) {
        Decision::Admitted => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static(RATE_LIMIT_HEADER),
                HeaderValue::from(state.controller.policy().limit()),
            );
            response
        }
        decision @ Decision::Rejected { .. } => {
            let retry_after_secs = decision.retry_after_secs().unwrap_or(1);
            debug!(
                key = %key,
                path = %request.uri().path(),
                retry_after_secs,
                "Request rejected by rate limiter"
            );
            rate_limit_exceeded_response(retry_after_secs)
        }
    }
}

/// Generate a 429 Too Many Requests response
fn rate_limit_exceeded_response(retry_after_secs: u64) -> Response {
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "retry_after_secs": retry_after_secs,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

/// Request ids as UUID v4 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}
