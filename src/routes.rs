use axum::{Router, middleware, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::datalayer::db_ops::connection_pool::PoolDriver;
use crate::handlers::health;
use crate::middleware::{error_handling_middleware, not_found, request_id_middleware};
use crate::state::AppState;

/// Create the main application router with all routes and middleware
pub fn create_router<D: PoolDriver>(state: AppState<D>) -> Router {
    // Health routes
    let health_routes = Router::new()
        .route("/health", get(health::health_check::<D>))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness::<D>));

    // Request id is the outer layer so the error logger can read it
    Router::new()
        .merge(health_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(error_handling_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
