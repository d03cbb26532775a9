//! Liveness probe at /health

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Requests currently being served
    pub in_flight: usize,
}

pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let in_flight = state
        .args
        .max_concurrent_requests
        .saturating_sub(state.limiter.available_permits());

    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started.elapsed().as_secs(),
            in_flight,
        },
    )
}
