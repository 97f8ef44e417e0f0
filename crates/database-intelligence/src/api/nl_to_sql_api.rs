//! Natural language to SQL endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::context_engine::{effective_request_id, ConversionRequest};
use crate::error::PipelineError;
use crate::shared_state::AppState;

/// POST /nl-to-sql/convert
pub async fn convert(
    State(state): State<AppState>,
    Json(mut payload): Json<ConversionRequest>,
) -> Response {
    // Fixed up front so error bodies carry the same id as the progress events
    let request_id = effective_request_id(payload.client_request_id.as_deref());
    payload.client_request_id = Some(request_id.clone());

    info!(
        "Convert request {} for database {}: '{}'",
        request_id, payload.database_id, payload.natural_language_query
    );

    if payload.natural_language_query.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, &payload, &request_id, "naturalLanguageQuery cannot be empty");
    }

    match state.orchestrator.convert(payload.clone()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            let status = match &e {
                PipelineError::DatabaseNotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_provider_failure() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            failure(status, &payload, &request_id, &e.to_string())
        }
    }
}

fn failure(status: StatusCode, request: &ConversionRequest, request_id: &str, message: &str) -> Response {
    let body = json!({
        "sqlQuery": "",
        "naturalLanguageQuery": request.natural_language_query,
        "relevantSchemas": [],
        "explanation": null,
        "isValid": false,
        "validationErrors": [format!("Error: {}", message)],
        "databaseId": request.database_id,
        "requestId": request_id,
    });
    (status, Json(body)).into_response()
}
