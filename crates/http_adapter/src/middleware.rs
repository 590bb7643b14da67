//! Rate-limit middleware (spec.md §6): stamps every limited response with
//! `X-RateLimit-*` headers, and turns a denied check into `429` with
//! `Retry-After`, without baking the rate limiter into any individual
//! route handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

const DEFAULT_TIER_LABEL: &str = "default";

/// Applied as an `axum::middleware::from_fn_with_state` layer over
/// [`crate::server::build_router`]'s state. Requests from a skipped IP,
/// or to a skipped path prefix, bypass the limiter entirely. A node run
/// without a rate limiter configured passes every request through
/// unchanged.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.clone() else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default();

    if limiter.config().path_is_skipped(&path) || limiter.config().ip_is_skipped(&ip) {
        return next.run(request).await;
    }

    let key = if ip.is_empty() { "unknown".to_string() } else { ip };
    let outcome = match limiter.check(&key, None) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(error = %err, "rate limiter check failed, allowing request through");
            return next.run(request).await;
        }
    };

    if !outcome.allowed {
        state.denied_counters.record(DEFAULT_TIER_LABEL);
        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        apply_headers(&mut response, outcome.limit, outcome.remaining, outcome.reset_in_seconds);
        if let Ok(value) = HeaderValue::from_str(&outcome.reset_in_seconds.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, outcome.limit, outcome.remaining, outcome.reset_in_seconds);
    response
}

fn apply_headers(response: &mut Response, limit: u64, remaining: u64, reset_in_seconds: u64) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_in_seconds.to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use node_core::{Node, NodeConfig};
    use rate_limiter::{RateLimiter, RateLimiterConfig, Tier};
    use tower::ServiceExt;

    use super::*;

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit))
            .with_state(state)
    }

    fn limited_state(max_requests: u64) -> Arc<AppState> {
        let node = Arc::new(Node::new(NodeConfig::default()));
        let limiter = RateLimiter::new(rate_limiter::LruStore::new(10, 60_000), RateLimiterConfig::new(Tier::new(max_requests, 60_000)));
        Arc::new(AppState::new(node, None, Some(Arc::new(limiter)), None))
    }

    fn request_from(ip: [u8; 4]) -> Request<Body> {
        Request::builder()
            .uri("/ping")
            .extension(ConnectInfo(SocketAddr::from((ip, 0))))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn allowed_request_carries_headers() {
        let response = app(limited_state(5)).oneshot(request_from([127, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");
    }

    #[tokio::test]
    async fn exhausted_budget_is_429_with_retry_after_and_counted() {
        let state = limited_state(1);
        let first = app(state.clone()).oneshot(request_from([127, 0, 0, 1])).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app(state.clone()).oneshot(request_from([127, 0, 0, 1])).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        assert_eq!(state.denied_counters.snapshot(), vec![(DEFAULT_TIER_LABEL.to_string(), 1)]);
    }

    #[tokio::test]
    async fn no_limiter_configured_passes_every_request_through() {
        let node = Arc::new(Node::new(NodeConfig::default()));
        let state = Arc::new(AppState::new(node, None, None, None));
        let response = app(state).oneshot(request_from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
