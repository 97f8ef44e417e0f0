use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};
use super::wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use super::{require_api_key, status_error, GenerationProvider};
use crate::config::Config;
use crate::error::ProviderError;

const PROVIDER: &str = "generation";

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// HTTP client for the `/chat/completions` endpoint.
pub struct GenerationClient {
    base_url: String,
    api_key: String,
    settings: GenerationSettings,
    http_client: reqwest::Client,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl GenerationClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            settings,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let settings = GenerationSettings {
            model: config.chat_model.clone(),
            temperature: config.chat_temperature,
            max_tokens: config.chat_max_tokens,
        };
        Self::new(
            &config.openai_api_url,
            &config.openai_api_key,
            settings,
            Duration::from_secs(config.provider_timeout_seconds),
        )
        .map(|client| {
            client.with_retry_policy(RetryPolicy::new(
                config.provider_max_attempts,
                Duration::from_secs(2),
            ))
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn request_once(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: messages.to_vec(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyPayload)?;
        if let Some(reason) = &choice.finish_reason {
            debug!("Completion finished: {}", reason);
        }
        let content = choice
            .message
            .map(|m| m.content)
            .ok_or(ProviderError::EmptyPayload)?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl GenerationProvider for GenerationClient {
    async fn generate(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError> {
        require_api_key(&self.api_key)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));

        with_retry(PROVIDER, &self.retry, self.sleeper.as_ref(), || {
            self.request_once(&messages)
        })
        .await
    }
}
