use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context_engine::similarity::Embedded;

/// Stored description of one table or schema plus its embedding.
///
/// Created by indexing and replaced whole by re-indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing)]
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaDescriptor {
    /// Unsaved descriptor; the index assigns `id` on write.
    pub fn new(
        database_id: i64,
        name: impl Into<String>,
        description: impl Into<String>,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            database_id,
            name: name.into(),
            description: description.into(),
            vector,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

impl Embedded for SchemaDescriptor {
    fn vector(&self) -> &[f32] {
        &self.vector
    }
}
