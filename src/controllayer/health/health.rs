use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::datalayer::db_ops::connection_pool::PoolDriver;
use crate::datalayer::db_ops::constants::{ConnectionState, HealthReport};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `OPERATIONAL` or `DEGRADED`
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub response_time_ms: u64,
    pub database: HealthReport,
}

/// Readiness probe response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database_state: ConnectionState,
}

/// Health check endpoint handler
///
/// Returns 200 OK if the database probe passed
/// Returns 503 Service Unavailable otherwise
pub async fn health_check<D: PoolDriver>(State(state): State<AppState<D>>) -> impl IntoResponse {
    let started = Instant::now();
    let database = state.db.health_check().await;

    let (status_code, status) = if database.is_healthy() {
        (StatusCode::OK, "OPERATIONAL")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DEGRADED")
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        response_time_ms: started.elapsed().as_millis() as u64,
        database,
    };

    (status_code, Json(response))
}

/// Liveness probe endpoint
///
/// Simple endpoint that returns 200 OK if the service is running
/// Used by Kubernetes/Docker for liveness checks
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe endpoint
///
/// Returns 200 OK while the database is connected
/// Returns 503 Service Unavailable while connecting, healing or disconnected
pub async fn readiness<D: PoolDriver>(State(state): State<AppState<D>>) -> impl IntoResponse {
    let database_state = state.db.state();
    let ready = database_state == ConnectionState::Connected;

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            ready,
            database_state,
        }),
    )
}
