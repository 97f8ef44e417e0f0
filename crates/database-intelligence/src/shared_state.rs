//! Shared application state
//!
//! Every collaborator is built here and handed to its dependents through
//! constructors. Handlers receive a cheap clone of [`AppState`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::Config,
    context_engine::{PipelineOrchestrator, SchemaRetriever},
    llm_client::{EmbeddingClient, EmbeddingProvider, GenerationClient, GenerationProvider},
    progress::{BroadcastPublisher, ProgressPublisher},
    query_executor::{Dialect, QueryExecutor, SqliteDriver},
    schema_index::{IndexDatabase, ProfileRepository, SchemaIndex, SchemaIndexer},
};

/// State shared by all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub indexer: Arc<SchemaIndexer>,
    pub profiles: Arc<dyn ProfileRepository>,
    /// Concrete broadcaster so the event streams can subscribe
    pub events: BroadcastPublisher,
}

impl AppState {
    /// Wires the pipelines from already-built providers and stores.
    pub fn assemble(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        index: Arc<dyn SchemaIndex>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let events = BroadcastPublisher::new();
        let publisher: Arc<dyn ProgressPublisher> = Arc::new(events.clone());

        let mut executor = QueryExecutor::new(publisher.clone())
            .with_timeouts(config.default_query_timeout_seconds, config.max_query_timeout_seconds);
        if let Some(dir) = &config.sqlite_data_dir {
            info!("SQLite profiles enabled for files under {}", dir.display());
            executor = executor.with_driver(
                Dialect::Sqlite,
                Arc::new(SqliteDriver::new(dir).with_blocked_path(&config.index_db_path)),
            );
        }
        let executor = Arc::new(executor);
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            SchemaRetriever::new(embedder.clone(), index.clone()),
            generator,
            profiles.clone(),
            executor,
            publisher,
            config.default_top_k,
        ));
        let indexer = Arc::new(SchemaIndexer::new(embedder, index));

        Self {
            config: Arc::new(config),
            orchestrator,
            indexer,
            profiles,
            events,
        }
    }

    /// Production wiring: provider clients from the config and the SQLite index file.
    /// Falls back to an in-memory index when the file cannot be opened.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let database = match IndexDatabase::new(&config.index_db_path) {
            Ok(db) => {
                info!("Schema index initialized at: {}", config.index_db_path.display());
                db
            }
            Err(e) => {
                warn!("Failed to open schema index: {}. Falling back to in-memory.", e);
                IndexDatabase::new_in_memory()?
            }
        };

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(EmbeddingClient::from_config(&config)?);
        let generator: Arc<dyn GenerationProvider> = Arc::new(GenerationClient::from_config(&config)?);

        Ok(Self::assemble(
            config,
            embedder,
            generator,
            Arc::new(database.schemas),
            Arc::new(database.profiles),
        ))
    }
}
