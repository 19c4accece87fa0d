//! Rapport Extraktor Library
//!
//! Multi-pass LLM extraction of Nordic quarterly PDF reports into a
//! query-ready SQLite dataset: metadata, financial tables, narrative
//! sections with embeddings, and chart descriptors.

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Semaphore;

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    BatchOrchestrator, CheckpointService, EmbeddingService, ExtractionPipeline, LlmClient,
    PassRunner, ProgressCallback, ProgressEvent, ReportService, RetryPolicy, Store,
};
pub use utils::{ExtractError, ExtractResult};

/// Application environment.
///
/// Design Philosophy: no process-wide singletons - everything a component
/// needs is constructed once here and passed down. Services are wrapped
/// in Arc for cheap cloning into worker tasks.
#[derive(Clone)]
pub struct Env {
    pub db: SqlitePool,
    pub config: Config,

    pub store: Store,
    pub pipeline: Arc<ExtractionPipeline>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub checkpoints: CheckpointService,
    pub reports: Arc<ReportService>,
}

impl Env {
    /// Open the database, build the LLM client and wire every service.
    ///
    /// The embedding service is constructed on demand instead (see
    /// [`Env::embedding_service`]) so extraction does not require an
    /// embedding API key.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let db = db::init_pool(&config.database.url).await?;
        let store = Store::new(db.clone());

        let llm = Arc::new(LlmClient::new(&config.llm)?);
        let semaphore = Arc::new(Semaphore::new(config.llm.max_concurrent));
        let runner = PassRunner::new(llm, semaphore, config.llm.clone());

        let pipeline = Arc::new(ExtractionPipeline::new(
            runner,
            store.clone(),
            config.extraction.max_attempts,
        ));

        let checkpoints = CheckpointService::new(
            Path::new(&config.extraction.base_folder).join(&config.extraction.checkpoint_file),
        );

        let orchestrator = Arc::new(BatchOrchestrator::new(
            Arc::clone(&pipeline),
            store.clone(),
            checkpoints.clone(),
            config.extraction.clone(),
        ));

        let reports = Arc::new(ReportService::new(
            store.clone(),
            config.extraction.clone(),
            config.embedding.clone(),
        ));

        Ok(Self {
            db,
            store,
            pipeline,
            orchestrator,
            checkpoints,
            reports,
            config,
        })
    }

    /// Build the embedding service; fails without the embedding API key
    pub fn embedding_service(&self) -> ExtractResult<EmbeddingService> {
        EmbeddingService::new(self.store.clone(), self.config.embedding.clone())
    }
}
