use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

use crate::errors::errors::create_error_response;
use crate::middleware::request_id::get_request_id;

/// Error logging middleware
/// Logs every 4xx/5xx response together with its request id
pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let request_id = get_request_id(&request).map(|id| id.to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            status = %status,
            method = %method,
            uri = %uri,
            request_id = ?request_id,
            "Request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            status = %status,
            method = %method,
            uri = %uri,
            request_id = ?request_id,
            "Request rejected"
        );
    }

    response
}

/// Fallback for unknown routes
pub async fn not_found(request: Request) -> Response {
    create_error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("No route for {} {}", request.method(), request.uri().path()),
    )
}
