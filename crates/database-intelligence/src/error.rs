//! Error taxonomy shared by the provider clients and the pipelines.
//!
//! Provider errors describe what the external embedding/generation service did;
//! pipeline errors describe which stage of a conversion or execution run failed.

use thiserror::Error;

/// Failures talking to an external embedding or generation service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials are missing locally; no request was attempted.
    #[error("provider is not configured: {0}")]
    Configuration(String),

    /// The provider rejected the credentials (HTTP 401). Never retried.
    #[error("provider API key is invalid or not configured")]
    Auth,

    /// HTTP 429 from the provider. Only seen inside the retry loop.
    #[error("provider rate limit hit")]
    RateLimited,

    /// Rate limiting persisted through every retry.
    #[error("rate limit exceeded after {attempts} attempts, please wait a minute and try again")]
    RateLimitExceeded { attempts: u32 },

    /// A 2xx response without usable data (no choices, no embeddings).
    #[error("provider returned an empty payload")]
    EmptyPayload,

    /// Any other non-2xx status.
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// The provider produced a vector of unexpected length.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl ProviderError {
    /// Whether the retry loop should sleep and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Failures that terminate a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Database not found with ID: {0}")]
    DatabaseNotFound(i64),

    #[error("Schema retrieval failed: {0}")]
    Retrieval(String),

    #[error("LLM generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("Embedding generation failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("SQL validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Unsupported database type: {0}")]
    UnsupportedDialect(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Stage code reported on the progress channel when this error ends a run.
    pub fn stage_code(&self) -> &'static str {
        match self {
            PipelineError::DatabaseNotFound(_) => "DATABASE_LOOKUP_FAILED",
            PipelineError::Retrieval(_) => "RETRIEVAL_FAILED",
            PipelineError::Generation(_) => "GENERATION_FAILED",
            PipelineError::Embedding(_) => "EMBEDDING_FAILED",
            PipelineError::Validation(_) => "VALIDATION_FAILED",
            PipelineError::UnsupportedDialect(_) => "CONFIGURATION_ERROR",
            PipelineError::Storage(_) | PipelineError::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    /// True when the run failed because an external provider misbehaved.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, PipelineError::Generation(_) | PipelineError::Embedding(_))
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
