// database-intelligence/crates/database-intelligence/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub chat_max_tokens: u32,
    pub provider_timeout_seconds: u64,
    /// Total calls per provider request, the first one included.
    pub provider_max_attempts: u32,
    pub api_host: String,
    pub api_port: u16,
    pub index_db_path: PathBuf,
    /// SQLite profiles are only served when this is set, and only from files under it.
    pub sqlite_data_dir: Option<PathBuf>,
    pub default_top_k: usize,
    pub default_query_timeout_seconds: u64,
    pub max_query_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        // The key is checked here so a missing credential surfaces before any provider call
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::Configuration("OPENAI_API_KEY is not set".into()))
            .context("OPENAI_API_KEY environment variable not set. Please set it in your .env file")?;

        let openai_api_url = env::var("OPENAI_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into())
            .trim_end_matches('/')
            .to_string();

        let default_query_timeout_seconds: u64 = env::var("DEFAULT_QUERY_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".into())
            .parse()?;
        let max_query_timeout_seconds: u64 = env::var("MAX_QUERY_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "300".into())
            .parse()?;
        if default_query_timeout_seconds == 0 || default_query_timeout_seconds > max_query_timeout_seconds {
            return Err(anyhow::anyhow!(
                "DEFAULT_QUERY_TIMEOUT_SECONDS ({}) must be between 1 and MAX_QUERY_TIMEOUT_SECONDS ({})",
                default_query_timeout_seconds,
                max_query_timeout_seconds
            ));
        }

        Ok(Self {
            openai_api_key,
            openai_api_url,
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-ada-002".into()),
            embedding_dimension: env::var("EMBEDDING_DIMENSION")
                .unwrap_or_else(|_| "1536".into())
                .parse()?,
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".into()),
            chat_temperature: env::var("CHAT_TEMPERATURE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()?,
            chat_max_tokens: env::var("CHAT_MAX_TOKENS")
                .unwrap_or_else(|_| "500".into())
                .parse()?,
            provider_timeout_seconds: env::var("PROVIDER_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            provider_max_attempts: env::var("PROVIDER_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8080".into()).parse()?,
            index_db_path: PathBuf::from(
                env::var("INDEX_DB_PATH").unwrap_or_else(|_| "./data/schema_index.db".into()),
            ),
            sqlite_data_dir: env::var("SQLITE_DATA_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            default_top_k: env::var("DEFAULT_TOP_K")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            default_query_timeout_seconds,
            max_query_timeout_seconds,
        })
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let visible: String = self
            .openai_api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Provider URL: {}", self.openai_api_url);
        info!("- Provider Key: {}", self.masked_api_key());
        info!("- Embedding Model: {} (dim {})", self.embedding_model, self.embedding_dimension);
        info!("- Chat Model: {}", self.chat_model);
        info!("- Temperature: {}", self.chat_temperature);
        info!("- Max Tokens: {}", self.chat_max_tokens);
        info!("- Provider Timeout: {}s", self.provider_timeout_seconds);
        info!("- Provider Attempts: {}", self.provider_max_attempts);
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Index DB: {}", self.index_db_path.display());
        match &self.sqlite_data_dir {
            Some(dir) => info!("- SQLite Data Dir: {}", dir.display()),
            None => info!("- SQLite Data Dir: (disabled)"),
        }
        info!("- Default topK: {}", self.default_top_k);
        info!(
            "- Query Timeout: {}s (max {}s)",
            self.default_query_timeout_seconds, self.max_query_timeout_seconds
        );
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        openai_api_key: "sk-test-abcd1234".to_string(),
        openai_api_url: "http://127.0.0.1:9".to_string(),
        embedding_model: "text-embedding-ada-002".to_string(),
        embedding_dimension: 3,
        chat_model: "gpt-3.5-turbo".to_string(),
        chat_temperature: 0.7,
        chat_max_tokens: 500,
        provider_timeout_seconds: 5,
        provider_max_attempts: 3,
        api_host: "127.0.0.1".to_string(),
        api_port: 8080,
        index_db_path: PathBuf::from("./data/test_index.db"),
        sqlite_data_dir: None,
        default_top_k: 5,
        default_query_timeout_seconds: 30,
        max_query_timeout_seconds: 300,
    }
}
