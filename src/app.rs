use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    BoxError, Json, Router,
};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{auth, error::AppError, middleware, state::AppState, tasks};

pub const SERVICE_NAME: &str = "taskhub";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub fn build_app(state: AppState) -> Router {
    let trust_proxy = state.config.rate_limit.trust_proxy;

    let protected = tasks::router().route_layer(from_fn_with_state(
        state.jwt.clone(),
        middleware::auth::require_auth,
    ));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest(
            "/api/v1",
            Router::new().merge(auth::router()).merge(protected),
        )
        .fallback(not_found)
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_error))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .layer(from_fn_with_state(
            state.rate_limiter.clone(),
            middleware::rate_limit::enforce,
        ))
        .layer(from_fn(middleware::security::security_headers))
        .layer(from_fn(middleware::cors::cors))
        .layer(from_fn(middleware::recovery::catch_panic))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |req: &Request<Body>| {
                    middleware::access_log::make_span(req, trust_proxy)
                })
                .on_response(middleware::access_log::on_response)
                .on_failure(()),
        )
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

async fn timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Timeout
    } else {
        error!(error = %err, "unhandled middleware error");
        AppError::Internal
    }
}

async fn index() -> Json<String> {
    Json(format!(
        "{SERVICE_NAME} API {}",
        OffsetDateTime::now_utc().year()
    ))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    service: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        timestamp: OffsetDateTime::now_utc(),
        service: SERVICE_NAME,
    })
}

/// Serve until SIGINT/SIGTERM, then give in-flight requests up to 30 s.
/// `shutdown_tx` is flipped to `true` so background workers stop as well.
pub async fn serve(
    app: Router,
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on {}", addr);

    let mut drain = shutdown_tx.subscribe();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = drain.wait_for(|stop| *stop).await;
        })
        .await
    });

    tokio::select! {
        res = &mut server => {
            return res.context("server task")?.context("server error");
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining connections");
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(res) => res.context("server task")?.context("server error")?,
        Err(_) => {
            warn!("graceful shutdown timed out; closing remaining connections");
            server.abort();
        }
    }
    info!("server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn slow_handler_gets_timeout_envelope() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(timeout_error))
                    .layer(TimeoutLayer::new(Duration::from_millis(20))),
            );

        let resp = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "request_timeout");
        assert_eq!(body["message"], "Request timed out");
    }

    #[tokio::test]
    async fn other_layer_errors_are_internal() {
        let resp = timeout_error("boom".into()).await.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
