use std::sync::Arc;
use tracing::{info, warn};

use super::descriptor::SchemaDescriptor;
use super::SchemaIndex;
use crate::context_engine::similarity::Ranked;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::llm_client::EmbeddingProvider;

/// Embeds schema descriptions and stores them in a [`SchemaIndex`].
pub struct SchemaIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SchemaIndex>,
}

impl SchemaIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn SchemaIndex>) -> Self {
        Self { embedder, index }
    }

    /// Vectors must match the embedder's dimension and any descriptors
    /// already stored for the same database, or nothing is written.
    pub async fn index_schema(
        &self,
        database_id: i64,
        name: &str,
        description: &str,
        metadata: serde_json::Value,
    ) -> PipelineResult<SchemaDescriptor> {
        let vector = self
            .embedder
            .embed(description)
            .await
            .map_err(PipelineError::Embedding)?;
        self.check_dimension(database_id, vector.len()).await?;

        let stored = self
            .index
            .add(SchemaDescriptor::new(database_id, name, description, vector, metadata))
            .await?;
        info!(
            "Indexed schema {} for database {} (id {})",
            stored.name, stored.database_id, stored.id
        );
        Ok(stored)
    }

    async fn check_dimension(&self, database_id: i64, actual: usize) -> PipelineResult<()> {
        let mismatch = |expected: usize| {
            warn!(
                "Refusing {}-d vector for database {}, expected {}",
                actual, database_id, expected
            );
            Err(PipelineError::Embedding(ProviderError::DimensionMismatch { expected, actual }))
        };

        let expected = self.embedder.dimension();
        if actual != expected {
            return mismatch(expected);
        }
        if let Some(existing) = self.index.list(database_id).await?.first() {
            if existing.dimension() != actual {
                return mismatch(existing.dimension());
            }
        }
        Ok(())
    }

    /// Embeds free text and ranks one database's descriptors against it.
    pub async fn search(
        &self,
        database_id: i64,
        query: &str,
        top_k: usize,
    ) -> PipelineResult<Vec<Ranked<SchemaDescriptor>>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(PipelineError::Embedding)?;
        self.index
            .search(database_id, &vector, top_k)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))
    }

    pub fn index(&self) -> &Arc<dyn SchemaIndex> {
        &self.index
    }
}
