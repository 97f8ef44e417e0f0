//! Context engine module - schema retrieval, prompt assembly and the two pipelines

pub mod orchestrator;
pub mod prompt_builder;
pub mod retrieval;
pub mod similarity;

pub use orchestrator::{
    effective_request_id, ConversionRequest, ConversionResponse, ExecutionRequest, ExecutionResponse,
    PipelineOrchestrator,
};
pub use retrieval::{RelevantSchema, SchemaContext, SchemaRetriever};
pub use similarity::{cosine_similarity, rank, Ranked, SimilarityError};
