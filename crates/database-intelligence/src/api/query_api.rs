//! Query execution endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use crate::context_engine::ExecutionRequest;
use crate::query_executor::ExecutionOutcome;
use crate::shared_state::AppState;

/// POST /query-execution/execute
///
/// 200 on success, 400 when the statement was rejected by validation, 500 otherwise.
pub async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> Response {
    info!("Execute request for database {}", payload.database_id);

    let response = state.orchestrator.execute_query(payload).await;
    let status = match response.outcome() {
        ExecutionOutcome::Completed => StatusCode::OK,
        ExecutionOutcome::Rejected => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(response)).into_response()
}

/// GET /query-execution/test-connection/:database_id
pub async fn test_connection(
    State(state): State<AppState>,
    Path(database_id): Path<i64>,
) -> Response {
    let profile = match state.profiles.find_by_id(database_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            let body = json!({
                "databaseId": database_id,
                "connected": false,
                "message": format!("Database not found with ID: {}", database_id),
            });
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
        Err(e) => {
            warn!("Profile lookup failed for {}: {}", database_id, e);
            let body = json!({
                "databaseId": database_id,
                "connected": false,
                "message": format!("Connection test error: {}", e),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    let connected = state.orchestrator.executor().test_connection(&profile).await;
    let body = json!({
        "databaseId": database_id,
        "connected": connected,
        "message": if connected { "Database connection successful" } else { "Database connection failed" },
    });
    (StatusCode::OK, Json(body)).into_response()
}
