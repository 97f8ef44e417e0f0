// database-intelligence/crates/database-intelligence/src/lib.rs

pub mod api;
pub mod config;
pub mod context_engine;
pub mod error;
pub mod llm_client;
pub mod metrics;
pub mod progress;
pub mod query_executor;
pub mod schema_index;
pub mod server;
pub mod shared_state;
pub mod sql_validator;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::Config;
pub use context_engine::{
    ConversionRequest, ConversionResponse, ExecutionRequest, ExecutionResponse, PipelineOrchestrator,
    SchemaRetriever,
};
pub use error::{PipelineError, PipelineResult, ProviderError};
pub use progress::{BroadcastPublisher, ProgressPublisher, RecordingPublisher, StageEvent, StageStatus, Topic};
pub use query_executor::{ExecutionOutcome, QueryExecutor, QueryResult};
pub use schema_index::{ConnectionProfile, IndexDatabase, ProfileRepository, SchemaDescriptor, SchemaIndex, SchemaIndexer};
pub use server::{build_router, run_server};
pub use shared_state::AppState;
pub use sql_validator::{SqlValidationResult, SqlValidator};
