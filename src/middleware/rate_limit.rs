use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::client_ip;
use crate::{
    error::AppError,
    rate_limit::{Decision, RateLimiter},
};

/// Enforces the per-client quota and advertises it in `X-RateLimit-*` headers.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), req.extensions(), limiter.trust_proxy());

    match limiter.check(&ip).await {
        Decision::Bypassed => next.run(req).await,
        Decision::Allowed(usage) => {
            let mut response = next.run(req).await;
            usage.apply(response.headers_mut());
            response
        }
        Decision::Limited(usage) => {
            warn!(ip = %ip, path = %req.uri().path(), "rate limit exceeded");
            let mut response = AppError::RateLimited(format!(
                "Rate limit exceeded. Maximum {} requests per {} seconds",
                limiter.limit(),
                limiter.window().as_secs()
            ))
            .into_response();
            usage.apply(response.headers_mut());
            response
        }
    }
}
