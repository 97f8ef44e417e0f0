//! Clients for the hosted embedding and chat-completion services.
//!
//! Both clients speak the OpenAI wire format, authenticate with a bearer key
//! and share one retry loop for rate limiting.

pub mod embedding_client;
pub mod generation_client;
pub mod retry;
pub mod wire;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::ProviderError;

pub use embedding_client::EmbeddingClient;
pub use generation_client::{GenerationClient, GenerationSettings};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn dimension(&self) -> usize;
}

/// Produces free text from an optional system instruction and a user prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError>;
}

/// Maps a non-success HTTP status to the provider error the retry loop expects.
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    match response.status() {
        StatusCode::UNAUTHORIZED => ProviderError::Auth,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        status => {
            let body = response.text().await.unwrap_or_default();
            ProviderError::Provider {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Rejects blank keys before any request leaves the process.
pub(crate) fn require_api_key(api_key: &str) -> Result<(), ProviderError> {
    if api_key.trim().is_empty() {
        Err(ProviderError::Configuration(
            "provider API key is not set".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fakes;
