//! Operational HTTP endpoints (self-metrics server).
//!
//! - `/healthz` : liveness
//! - `/metrics` : relay self metrics, Prometheus text format

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::obs::RelayMetrics;
use crate::transport::scrape::CONTENT_TYPE;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(metrics): State<Arc<RelayMetrics>>) -> Response {
    let body = metrics.render();

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, CONTENT_TYPE)],
        body,
    )
        .into_response()
}
