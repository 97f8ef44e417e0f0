use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::descriptor::SchemaDescriptor;
use super::SchemaIndex;

/// Process-local index for tests and runs without a database file.
#[derive(Default)]
pub struct InMemorySchemaIndex {
    descriptors: RwLock<Vec<SchemaDescriptor>>,
}

impl InMemorySchemaIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaIndex for InMemorySchemaIndex {
    async fn add(&self, mut descriptor: SchemaDescriptor) -> anyhow::Result<SchemaDescriptor> {
        let mut descriptors = self.descriptors.write().await;
        let now = Utc::now();

        if let Some(existing) = descriptors
            .iter_mut()
            .find(|d| d.database_id == descriptor.database_id && d.name == descriptor.name)
        {
            descriptor.id = existing.id;
            descriptor.created_at = existing.created_at;
            descriptor.updated_at = now;
            *existing = descriptor.clone();
            return Ok(descriptor);
        }

        descriptor.id = descriptors.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        descriptor.created_at = now;
        descriptor.updated_at = now;
        descriptors.push(descriptor.clone());
        Ok(descriptor)
    }

    async fn list(&self, database_id: i64) -> anyhow::Result<Vec<SchemaDescriptor>> {
        let descriptors = self.descriptors.read().await;
        Ok(descriptors
            .iter()
            .filter(|d| d.database_id == database_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<SchemaDescriptor>> {
        let descriptors = self.descriptors.read().await;
        Ok(descriptors.iter().find(|d| d.id == id).cloned())
    }

    async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        let mut descriptors = self.descriptors.write().await;
        let before = descriptors.len();
        descriptors.retain(|d| d.id != id);
        Ok(descriptors.len() != before)
    }
}
