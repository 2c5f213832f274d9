//! `/metrics` endpoint for the Prometheus scraper.

use crate::errors::ExporterError;
use crate::exporter::render;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::Registry;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Registry>) -> Response {
    match render(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

/// Bind and serve until the task is dropped.
pub async fn serve(addr: SocketAddr, registry: Registry) -> Result<(), ExporterError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ExporterError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, router(registry))
        .await
        .map_err(ExporterError::Serve)
}
