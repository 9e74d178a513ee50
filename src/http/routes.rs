//! Route handlers for the decision API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::RateLimitingConfig;
use crate::limiter::{PolicySet, RateLimiter};

use super::middleware::{
    client_identity, decision_body, rate_limit_headers, too_many_requests,
};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The decision engine, for the generic endpoint
    pub limiter: Arc<RateLimiter>,
    /// Policies bound at startup, for the preset endpoints
    pub policies: Arc<PolicySet>,
    /// Limit applied when a generic caller supplies none
    pub default_limit: u64,
    /// Window in seconds applied when a generic caller supplies none
    pub default_window_secs: u64,
}

impl AppState {
    /// Assemble handler state from the configured components.
    pub fn new(
        limiter: Arc<RateLimiter>,
        policies: Arc<PolicySet>,
        config: &RateLimitingConfig,
    ) -> Self {
        Self {
            limiter,
            policies,
            default_limit: config.default_limit,
            default_window_secs: config.default_window_secs,
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rate-limit", post(check))
        .route("/api/limits/{name}/check", post(check_policy))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Body of the generic check endpoint.
#[derive(Debug, Deserialize)]
struct CheckRequest {
    /// Fully namespaced counter key
    key: String,
    /// Maximum permitted calls per window
    limit: Option<u64>,
    /// Window length in seconds
    window: Option<u64>,
}

/// Generic, caller-configured evaluation.
///
/// The low-level primitive: the caller picks the key, limit, and window,
/// which makes this unsuitable for untrusted callers (a permissive
/// configuration sidesteps any intended policy). Production traffic goes
/// through the preset endpoints instead. Denial is a normal outcome here
/// and still answers 200.
async fn check(State(state): State<AppState>, Json(req): Json<CheckRequest>) -> Response {
    if req.key.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "key must not be empty" })),
        )
            .into_response();
    }
    if req.window == Some(0) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "window must be at least one second" })),
        )
            .into_response();
    }

    let limit = req.limit.unwrap_or(state.default_limit);
    let window_secs = req.window.unwrap_or(state.default_window_secs);
    // Clamp rather than overflow on absurd caller-supplied windows.
    let window_ms = window_secs.saturating_mul(1000).min(i64::MAX as u64) as i64;

    let decision = state
        .limiter
        .check_and_consume(&req.key, limit, window_ms)
        .await;

    debug!(
        key = %req.key,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Generic rate limit decision"
    );

    Json(decision_body(&decision)).into_response()
}

/// Preset evaluation for the calling client.
///
/// Identity is derived from the forwarded-IP header; a denied call answers
/// 429 with `Retry-After` and the `X-RateLimit-*` headers.
async fn check_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(policy) = state.policies.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown policy '{name}'") })),
        )
            .into_response();
    };

    let identity = client_identity(&headers);
    let decision = policy.evaluate(identity).await;

    debug!(
        policy = %name,
        identity = %identity,
        allowed = decision.allowed,
        remaining = decision.remaining,
        degraded = decision.degraded,
        "Policy rate limit decision"
    );

    if decision.allowed {
        let mut response = (StatusCode::OK, Json(decision_body(&decision))).into_response();
        response
            .headers_mut()
            .extend(rate_limit_headers(policy.limit(), &decision));
        response
    } else {
        too_many_requests(policy.limit(), &decision)
    }
}
