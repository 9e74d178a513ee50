//! Request adapter pieces: caller identity, rate limit headers, and the
//! middleware consumers wrap around protected handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::limiter::{epoch_ms, RateLimitDecision, RateLimitPolicy};

const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Derive the caller identity from the forwarded-IP header.
///
/// Takes the first (client-most) entry of `x-forwarded-for`. Callers
/// without one all share the `"unknown"` bucket; that pooling is a known
/// property of the deployment, kept as-is.
pub fn client_identity(headers: &HeaderMap) -> &str {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
}

/// The rate limit headers attached to every evaluated response.
pub fn rate_limit_headers(limit: u64, decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(decision.reset_at_ms));
    headers
}

/// Window end as an RFC 3339 timestamp.
pub(crate) fn format_reset(reset_at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(reset_at_ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// JSON body reporting a decision to the caller.
pub(crate) fn decision_body(decision: &RateLimitDecision) -> serde_json::Value {
    json!({
        "allowed": decision.allowed,
        "remaining": decision.remaining,
        "resetTime": format_reset(decision.reset_at_ms),
    })
}

/// The standardized 429 response for a denied call.
pub fn too_many_requests(limit: u64, decision: &RateLimitDecision) -> Response {
    let mut headers = rate_limit_headers(limit, decision);
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs(epoch_ms())),
    );
    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(decision_body(decision)),
    )
        .into_response()
}

/// Axum middleware enforcing one policy around the wrapped handlers.
///
/// One evaluation per request: allowed requests pass through with the rate
/// limit headers appended, denied requests short-circuit to a 429 and never
/// reach the handler.
pub async fn enforce_policy(
    State(policy): State<Arc<RateLimitPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers()).to_string();
    let decision = policy.evaluate(&identity).await;

    if decision.allowed {
        let mut response = next.run(request).await;
        response
            .headers_mut()
            .extend(rate_limit_headers(policy.limit(), &decision));
        response
    } else {
        too_many_requests(policy.limit(), &decision)
    }
}
