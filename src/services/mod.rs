pub mod checkpoint_service;
pub mod embedding_service;
pub mod llm;
pub mod orchestrator;
pub mod passes;
pub mod pipeline;
pub mod repair;
pub mod report_service;
pub mod store;
pub mod validation;

pub use checkpoint_service::CheckpointService;
pub use embedding_service::{EmbeddingService, EMBEDDING_DIM};
pub use llm::{cost_sek, salvage_json, LlmClient, LlmResponse, ModelTier};
pub use orchestrator::{BatchOrchestrator, BatchOutcome};
pub use passes::{PassOutcome, PassRunner};
pub use pipeline::{
    parse_period_from_filename, ExtractionPipeline, ProgressCallback, ProgressEvent, RetryPolicy,
};
pub use repair::{validate_and_repair, RepairOutcome};
pub use report_service::{classify_severity, render_company_log, ReportService};
pub use store::{ChildCounts, EmbeddingStats, SectionForEmbedding, Store};
pub use validation::{validate_sections, validate_tables, ValidationOutcome};
