//! Correlation-id and rate-limit middleware.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ServeError;
use crate::state::AppState;

/// Header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Rate-limit response headers.
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Request extension carrying the resolved correlation id.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Read `X-Correlation-ID` or generate one; attach it to the request
/// extensions and the logging span, and echo it on the response.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    request.extensions_mut().insert(CorrelationId(id.clone()));

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        uri = %request.uri()
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    response
}

/// Resolve the limiter identifier: the configured client header when
/// client-based limiting is on and the header is present, else the remote IP
/// when IP-based limiting is on. `None` means the request is not limited.
pub(crate) fn client_identifier(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    config: &nlweb::RateLimitConfig,
) -> Option<String> {
    if config.enable_client_based {
        if let Some(value) = headers
            .get(config.client_id_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Some(format!("client:{value}"));
        }
    }
    if config.enable_ip_based {
        return Some(
            remote.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string()),
        );
    }
    None
}

/// Gate the request on the per-identifier budget and emit `X-RateLimit-*`
/// headers either way. Rejections carry `Retry-After`.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.is_enabled() {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let Some(identifier) =
        client_identifier(request.headers(), remote, &state.config.rate_limiting)
    else {
        return next.run(request).await;
    };

    if !state.limiter.allow(&identifier) {
        let status = state.limiter.status(&identifier);
        let correlation_id = request
            .extensions()
            .get::<CorrelationId>()
            .map_or("unknown", |id| id.0.as_str());
        let mut response = ServeError::core(
            nlweb::Error::RateLimited {
                retry_after_secs: status.reset_in.as_secs(),
            },
            correlation_id,
        )
        .into_response();
        append_rate_limit_headers(&mut response, &status);
        return response;
    }

    let status = state.limiter.status(&identifier);
    let mut response = next.run(request).await;
    append_rate_limit_headers(&mut response, &status);
    response
}

fn append_rate_limit_headers(response: &mut Response, status: &nlweb::RateLimitStatus) {
    let headers = response.headers_mut();
    let entries = [
        (RATE_LIMIT_LIMIT, status.total.to_string()),
        (RATE_LIMIT_REMAINING, status.remaining.to_string()),
        (RATE_LIMIT_RESET, status.reset_in.as_secs().to_string()),
    ];
    for (name, value) in entries {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}
