//! API module - HTTP handlers for the pipelines, the schema index and the profile registry

pub mod database_api;
pub mod events_api;
pub mod nl_to_sql_api;
pub mod query_api;
pub mod schema_api;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// `{"error": message}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
