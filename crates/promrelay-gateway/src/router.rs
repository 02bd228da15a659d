//! Axum router wiring.
//!
//! Each listener gets its own router with a single scrape route; the
//! self-metrics server gets `/metrics` and `/healthz`.

use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};

use crate::{app_state::ListenerState, obs::RelayMetrics, ops, transport};

pub fn build_router(state: ListenerState) -> Router {
    let path = state.path().to_string();
    Router::new()
        .route(&path, any(transport::scrape::scrape))
        .with_state(state)
}

pub fn build_ops_router(metrics: Arc<RelayMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(metrics)
}
