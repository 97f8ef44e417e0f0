//! Schema index endpoints: index, search, list and delete descriptors

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::error_response;
use crate::error::PipelineError;
use crate::schema_index::SchemaDescriptor;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchemaRequest {
    #[serde(alias = "databaseInfoId")]
    pub database_id: i64,
    pub schema_name: String,
    pub schema_description: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSchemasRequest {
    #[serde(alias = "databaseInfoId")]
    pub database_id: i64,
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSchema {
    #[serde(flatten)]
    pub schema: SchemaDescriptor,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchSchemasResponse {
    pub query: String,
    pub results: Vec<ScoredSchema>,
    pub count: usize,
}

fn pipeline_status(e: &PipelineError) -> StatusCode {
    if e.is_provider_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// POST /schema-embeddings/index
pub async fn index_schema(
    State(state): State<AppState>,
    Json(payload): Json<IndexSchemaRequest>,
) -> Response {
    if payload.schema_name.trim().is_empty() || payload.schema_description.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "schemaName and schemaDescription are required");
    }

    info!("Indexing schema '{}' for database {}", payload.schema_name, payload.database_id);
    match state
        .indexer
        .index_schema(
            payload.database_id,
            &payload.schema_name,
            &payload.schema_description,
            payload.metadata.unwrap_or_else(|| Value::Object(Default::default())),
        )
        .await
    {
        Ok(descriptor) => (StatusCode::CREATED, Json(descriptor)).into_response(),
        Err(e) => {
            warn!("Indexing failed: {}", e);
            error_response(pipeline_status(&e), e.to_string())
        }
    }
}

/// POST /schema-embeddings/search
pub async fn search_schemas(
    State(state): State<AppState>,
    Json(payload): Json<SearchSchemasRequest>,
) -> Response {
    let top_k = payload.top_k.unwrap_or(state.config.default_top_k);
    match state.indexer.search(payload.database_id, &payload.query, top_k).await {
        Ok(matches) => {
            let results: Vec<ScoredSchema> = matches
                .into_iter()
                .map(|m| ScoredSchema {
                    schema: m.item,
                    score: m.score,
                })
                .collect();
            let response = SearchSchemasResponse {
                query: payload.query,
                count: results.len(),
                results,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            warn!("Schema search failed: {}", e);
            error_response(pipeline_status(&e), e.to_string())
        }
    }
}

/// GET /schema-embeddings/database/:database_id
pub async fn list_schemas(State(state): State<AppState>, Path(database_id): Path<i64>) -> Response {
    match state.indexer.index().list(database_id).await {
        Ok(schemas) => (StatusCode::OK, Json(schemas)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /schema-embeddings/:id
pub async fn delete_schema(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.indexer.index().remove(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
