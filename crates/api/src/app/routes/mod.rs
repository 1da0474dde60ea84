use axum::Router;
use axum::http::StatusCode;

pub mod batches;
pub mod directory;
pub mod system;

use crate::app::errors;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/invoice-batches", batches::router())
        .merge(directory::router())
}

pub(crate) fn not_found_response(message: &'static str) -> axum::response::Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", message)
}
