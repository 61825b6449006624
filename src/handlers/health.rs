use crate::controllayer::health;
use crate::datalayer::db_ops::connection_pool::PoolDriver;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse};
use tracing::{info, instrument};

/// Health check handler that delegates to the controllayer database probe
#[instrument(skip(state), fields(service = "/health"))]
pub async fn health_check<D: PoolDriver>(state: State<AppState<D>>) -> impl IntoResponse {
    info!("Health check request received");
    health::health_check(state).await
}

#[instrument(fields(service = "/health/live"))]
pub async fn liveness() -> impl IntoResponse {
    health::liveness().await
}

#[instrument(skip(state), fields(service = "/health/ready"))]
pub async fn readiness<D: PoolDriver>(state: State<AppState<D>>) -> impl IntoResponse {
    health::readiness(state).await
}
