//! Deterministic providers for unit tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{EmbeddingProvider, GenerationProvider};
use crate::error::ProviderError;

/// Maps text to a 3-d vector by keyword: orders, users, anything else.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("order") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("user") || lower.contains("customer") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Always fails with the given error factory.
pub struct FailingEmbedder(pub fn() -> ProviderError);

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err((self.0)())
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err((self.0)())
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Returns a fixed completion (or error) and records every prompt pair.
pub struct ScriptedGenerator {
    reply: Result<String, fn() -> ProviderError>,
    prompts: Mutex<Vec<(Option<String>, String)>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: fn() -> ProviderError) -> Self {
        Self {
            reply: Err(err),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<(Option<String>, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.map(str::to_string), user.to_string()));
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}
