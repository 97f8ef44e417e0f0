//! Schema retrieval: embed the question, rank one database's descriptors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::similarity::Ranked;
use crate::error::{PipelineError, PipelineResult};
use crate::llm_client::EmbeddingProvider;
use crate::schema_index::{SchemaDescriptor, SchemaIndex};

/// Name and description of one retrieved schema, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantSchema {
    pub schema_name: String,
    pub schema_description: String,
}

/// Retrieved descriptors, best match first.
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    pub matches: Vec<Ranked<SchemaDescriptor>>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn schema_names(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.item.name.as_str()).collect()
    }

    pub fn relevant_schemas(&self) -> Vec<RelevantSchema> {
        self.matches
            .iter()
            .map(|m| RelevantSchema {
                schema_name: m.item.name.clone(),
                schema_description: m.item.description.clone(),
            })
            .collect()
    }

    /// Numbered listing used inside the user prompt.
    pub fn to_prompt_block(&self) -> String {
        if self.matches.is_empty() {
            return "No schema information available.".to_string();
        }

        let mut context = String::from("Available database schemas:\n\n");
        for (i, m) in self.matches.iter().enumerate() {
            context.push_str(&format!("{}. Schema: {}\n", i + 1, m.item.name));
            context.push_str(&format!("   Description: {}\n\n", m.item.description));
        }
        context
    }
}

pub struct SchemaRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SchemaIndex>,
}

impl SchemaRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn SchemaIndex>) -> Self {
        Self { embedder, index }
    }

    /// Any embedding or storage failure is a retrieval failure.
    pub async fn retrieve(
        &self,
        database_id: i64,
        question: &str,
        top_k: usize,
    ) -> PipelineResult<SchemaContext> {
        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;

        let matches = self
            .index
            .search(database_id, &query_vector, top_k)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;

        debug!(
            "Retrieved {} schemas for database {}: {:?}",
            matches.len(),
            database_id,
            matches.iter().map(|m| (&m.item.name, m.score)).collect::<Vec<_>>()
        );
        Ok(SchemaContext { matches })
    }
}
