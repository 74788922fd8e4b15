use std::time::Duration;

use axum::{
    body::Body,
    http::{header::USER_AGENT, Request, Response},
};
use tracing::{field, Span};

use super::client_ip;

pub fn make_span(req: &Request<Body>, trust_proxy: bool) -> Span {
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        query = req.uri().query().unwrap_or(""),
        ip = %client_ip(req.headers(), req.extensions(), trust_proxy),
        user_agent,
        status = field::Empty,
        latency_ms = field::Empty,
    )
}

/// Client and server errors are logged at `error`, everything else at `info`.
pub fn on_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status();
    let latency_ms = latency.as_millis() as u64;
    span.record("status", status.as_u16());
    span.record("latency_ms", latency_ms);
    if status.as_u16() >= 400 {
        tracing::error!(status = status.as_u16(), latency_ms, "request completed");
    } else {
        tracing::info!(status = status.as_u16(), latency_ms, "request completed");
    }
}
