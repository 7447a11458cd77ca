//! Liveness probe
//!
//! /health returns 200 whenever the process is serving, regardless of the
//! store backend.

use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::common::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Storage backend in use
    pub store: &'static str,
    pub catalog_version: u32,
    pub timestamp: String,
    pub dev_mode: bool,
}

/// GET /health
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    let response = HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        store: state.store_label,
        catalog_version: state.ledger.catalog().version,
        timestamp: chrono::Utc::now().to_rfc3339(),
        dev_mode: state.args.dev_mode,
    };

    json_response(StatusCode::OK, &response)
}
