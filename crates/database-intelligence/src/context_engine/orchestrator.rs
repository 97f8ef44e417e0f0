use crate::context_engine::prompt_builder::{build_explanation, build_system_prompt, build_user_prompt};
use crate::context_engine::retrieval::{RelevantSchema, SchemaRetriever};
use crate::error::{PipelineError, PipelineResult};
use crate::llm_client::GenerationProvider;
use crate::metrics;
use crate::progress::{ProgressPublisher, StageReporter, Topic};
use crate::query_executor::{ExecutionOutcome, QueryExecutor, QueryResult};
use crate::schema_index::{ConnectionProfile, ProfileRepository};
use crate::sql_validator::SqlValidator;
use crate::utils::clean_generated_sql;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Conversion input. `top_k` falls back to the orchestrator default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    #[serde(alias = "databaseInfoId")]
    pub database_id: i64,
    pub natural_language_query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub client_request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub sql_query: String,
    pub natural_language_query: String,
    pub relevant_schemas: Vec<RelevantSchema>,
    pub explanation: String,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub database_id: i64,
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(alias = "databaseInfoId")]
    pub database_id: i64,
    pub sql_query: String,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub client_request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    #[serde(flatten)]
    pub result: QueryResult,
    pub sql_query: String,
    pub database_id: i64,
    pub request_id: String,
}

impl ExecutionResponse {
    pub fn outcome(&self) -> ExecutionOutcome {
        self.result.outcome
    }
}

/// Client id when it is non-blank, otherwise a fresh v4 uuid.
pub fn effective_request_id(client_request_id: Option<&str>) -> String {
    match client_request_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Drives both pipelines. Every collaborator is handed in by the caller.
pub struct PipelineOrchestrator {
    retriever: SchemaRetriever,
    generator: Arc<dyn GenerationProvider>,
    validator: SqlValidator,
    profiles: Arc<dyn ProfileRepository>,
    executor: Arc<QueryExecutor>,
    publisher: Arc<dyn ProgressPublisher>,
    default_top_k: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        retriever: SchemaRetriever,
        generator: Arc<dyn GenerationProvider>,
        profiles: Arc<dyn ProfileRepository>,
        executor: Arc<QueryExecutor>,
        publisher: Arc<dyn ProgressPublisher>,
        default_top_k: usize,
    ) -> Self {
        info!("Pipeline orchestrator initialized (default topK {})", default_top_k);
        Self {
            retriever,
            generator,
            validator: SqlValidator::new(),
            profiles,
            executor,
            publisher,
            default_top_k,
        }
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    async fn lookup_profile(&self, database_id: i64) -> PipelineResult<ConnectionProfile> {
        self.profiles
            .find_by_id(database_id)
            .await?
            .ok_or(PipelineError::DatabaseNotFound(database_id))
    }

    /// Natural language to SQL.
    ///
    /// Lookup, retrieval and generation failures end the run with an error event
    /// and an `Err`. A statement that fails validation still completes: the
    /// response carries `is_valid = false` and the error list.
    pub async fn convert(&self, request: ConversionRequest) -> PipelineResult<ConversionResponse> {
        let request_id = effective_request_id(request.client_request_id.as_deref());
        let reporter = StageReporter::new(self.publisher.clone(), Topic::NlToSql, request_id.as_str());
        let top_k = request.top_k.unwrap_or(self.default_top_k);
        let database_id = request.database_id;

        let meta = json!({
            "databaseId": database_id,
            "query": request.natural_language_query,
            "topK": top_k,
        });
        reporter.progress(
            "REQUEST_RECEIVED",
            "Received NL to SQL conversion request",
            Some(meta.clone()),
        );

        let result = self.run_conversion(&reporter, &request, top_k).await;
        match &result {
            Ok(response) => {
                metrics::inc_pipeline("nl_to_sql", "completed");
                info!(
                    "request_id={} converted query for database {} (valid: {})",
                    request_id, database_id, response.is_valid
                );
            }
            Err(e) => {
                metrics::inc_pipeline("nl_to_sql", "error");
                if e.is_provider_failure() {
                    warn!("request_id={} {}", request_id, e);
                } else {
                    error!("request_id={} {}", request_id, e);
                }
                let data = match e {
                    PipelineError::DatabaseNotFound(_) => Some(meta),
                    PipelineError::Retrieval(_) => Some(json!({ "databaseId": database_id })),
                    _ => None,
                };
                reporter.error(e.stage_code(), e.to_string(), data);
            }
        }
        result
    }

    async fn run_conversion(
        &self,
        reporter: &StageReporter,
        request: &ConversionRequest,
        top_k: usize,
    ) -> PipelineResult<ConversionResponse> {
        let profile = self.lookup_profile(request.database_id).await?;

        reporter.progress(
            "RETRIEVING_SCHEMA",
            "Retrieving relevant schema context",
            Some(json!({ "databaseId": request.database_id })),
        );
        let context = self
            .retriever
            .retrieve(request.database_id, &request.natural_language_query, top_k)
            .await?;

        reporter.progress(
            "PROMPT_BUILDING",
            "Building prompt with schema context",
            Some(json!({ "schemaCount": context.len() })),
        );
        let system_prompt = build_system_prompt(&profile.dialect);
        let user_prompt = build_user_prompt(&request.natural_language_query, &context);
        debug!("User prompt:\n{}", user_prompt);

        reporter.progress("LLM_CALL", "Generating SQL with GPT", None);
        let generated = self
            .generator
            .generate(Some(&system_prompt), &user_prompt)
            .await
            .map_err(PipelineError::Generation)?;

        let sql = clean_generated_sql(&generated);
        let validation = self.validator.validate(&sql);
        reporter.progress(
            "VALIDATION",
            "Validating generated SQL",
            Some(json!({
                "isValid": validation.is_valid,
                "errorCount": validation.errors.len(),
            })),
        );
        if !validation.is_valid {
            warn!(
                "request_id={} generated SQL failed validation: {:?}",
                reporter.request_id(),
                validation.errors
            );
        }

        let explanation = build_explanation(&request.natural_language_query, &sql, &context);

        reporter.success(
            "COMPLETED",
            "NL to SQL conversion completed",
            Some(json!({
                "isValid": validation.is_valid,
                "schemaCount": context.len(),
            })),
        );

        Ok(ConversionResponse {
            sql_query: sql,
            natural_language_query: request.natural_language_query.clone(),
            relevant_schemas: context.relevant_schemas(),
            explanation,
            is_valid: validation.is_valid,
            validation_errors: validation.errors,
            database_id: request.database_id,
            request_id: reporter.request_id().to_string(),
        })
    }

    /// Validated, read-only execution. Never returns an error: failures are
    /// reported in the response and as an `ERROR`/`TIMEOUT` event.
    pub async fn execute_query(&self, request: ExecutionRequest) -> ExecutionResponse {
        let request_id = effective_request_id(request.client_request_id.as_deref());
        let reporter = StageReporter::new(self.publisher.clone(), Topic::QueryExecution, request_id.as_str());
        let started = Instant::now();
        let received_at = Utc::now();

        reporter.progress(
            "REQUEST_RECEIVED",
            "Received query execution request",
            Some(json!({
                "databaseId": request.database_id,
                "timeoutSeconds": request.timeout_seconds,
            })),
        );

        let result = self.run_execution(&reporter, &request, started, received_at).await;

        metrics::inc_pipeline("query_execution", result.outcome.as_str());
        ExecutionResponse {
            result,
            sql_query: request.sql_query,
            database_id: request.database_id,
            request_id,
        }
    }

    async fn run_execution(
        &self,
        reporter: &StageReporter,
        request: &ExecutionRequest,
        started: Instant,
        received_at: chrono::DateTime<Utc>,
    ) -> QueryResult {
        let validation = self.validator.validate(&request.sql_query);
        if !validation.is_valid {
            let e = PipelineError::Validation(validation.errors.clone());
            warn!("request_id={} {}", reporter.request_id(), e);
            reporter.error("ERROR", e.to_string(), Some(json!({ "errors": validation.errors })));
            return QueryResult::failed(ExecutionOutcome::Rejected, e.to_string(), started, received_at);
        }
        reporter.progress("VALIDATED", "SQL passed safety validation", None);

        let profile = match self.lookup_profile(request.database_id).await {
            Ok(profile) => profile,
            Err(e) => {
                let outcome = match e {
                    PipelineError::DatabaseNotFound(_) => ExecutionOutcome::NotFound,
                    _ => ExecutionOutcome::Failed,
                };
                warn!("request_id={} {}", reporter.request_id(), e);
                reporter.error("ERROR", e.to_string(), Some(json!({ "databaseId": request.database_id })));
                return QueryResult::failed(outcome, e.to_string(), started, received_at);
            }
        };

        self.executor
            .execute(
                &profile,
                &request.sql_query,
                request.timeout_seconds,
                reporter.request_id(),
            )
            .await
    }
}
