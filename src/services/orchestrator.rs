//! Batch Orchestrator - bounded-parallel fan-out over a set of PDFs.
//!
//! One logical task per PDF; the shared LLM semaphore caps in-flight
//! requests across all passes of all workers. Workers report completion
//! over a channel and the orchestrator task alone writes the checkpoint
//! file. Individual failures are recorded, never fatal to the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ExtractionConfig;
use crate::models::Company;
use crate::services::checkpoint_service::CheckpointService;
use crate::services::pipeline::{ExtractionPipeline, ProgressCallback, RetryPolicy};
use crate::services::store::Store;
use crate::utils::{move_into_dir, ExtractResult};

/// Outcome of one batch run
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successes: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
    /// Files skipped because a checkpoint already lists them
    pub already_completed: usize,
}

enum WorkerReport {
    Completed(PathBuf),
    Failed(PathBuf, String),
    /// Canceled before starting; stays unprocessed for resume
    Skipped(PathBuf),
}

pub struct BatchOrchestrator {
    pipeline: Arc<ExtractionPipeline>,
    store: Store,
    checkpoints: CheckpointService,
    config: ExtractionConfig,
    cancel: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(
        pipeline: Arc<ExtractionPipeline>,
        store: Store,
        checkpoints: CheckpointService,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            checkpoints,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked before each worker starts; `main` wires SIGINT to it.
    /// In-flight extractions complete and their checkpoint entries are
    /// written before the batch returns.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn persisted_dir(&self, company: &Company) -> PathBuf {
        Path::new(&self.config.base_folder)
            .join(&company.slug)
            .join(&self.config.persisted_dir)
    }

    /// Run a batch of PDFs for one company.
    ///
    /// Returns `(successes, failures)`; files already completed in a
    /// resumable checkpoint for today's batch are skipped up front.
    pub async fn run_batch(
        &self,
        paths: Vec<PathBuf>,
        company_name: &str,
        use_cache: bool,
        on_progress: Option<ProgressCallback>,
        retry_policy: Option<RetryPolicy>,
    ) -> ExtractResult<BatchOutcome> {
        let company = self.store.upsert_company(company_name).await?;
        let batch_id = CheckpointService::batch_id("batch", &company.slug);
        let total_files = paths.len();

        let already_done = self.checkpoints.completed_files(&batch_id);
        let remaining: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| !already_done.contains(&p.display().to_string()))
            .collect();

        let mut outcome = BatchOutcome {
            already_completed: total_files - remaining.len(),
            ..Default::default()
        };

        if outcome.already_completed > 0 {
            info!(
                "Resuming batch {}: {} file(s) already completed",
                batch_id, outcome.already_completed
            );
        }
        if remaining.is_empty() {
            return Ok(outcome);
        }

        self.checkpoints.start_batch(&batch_id, total_files)?;

        let (tx, mut rx) = mpsc::channel::<WorkerReport>(remaining.len());
        let persisted_dir = self.persisted_dir(&company);

        for path in remaining {
            let tx = tx.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let company = company.clone();
            let cancel = Arc::clone(&self.cancel);
            let persisted_dir = persisted_dir.clone();
            let on_progress = on_progress.clone();
            let retry_policy = retry_policy.clone();

            tokio::spawn(async move {
                if cancel.load(Ordering::Relaxed) {
                    let _ = tx.send(WorkerReport::Skipped(path)).await;
                    return;
                }

                let result = pipeline
                    .extract_pdf(
                        &path,
                        &company,
                        use_cache,
                        on_progress.as_ref(),
                        retry_policy.as_ref(),
                    )
                    .await;

                let report = match result {
                    Ok(_) => {
                        // success moves the source out of pending
                        match move_into_dir(&path, &persisted_dir) {
                            Ok(_) => WorkerReport::Completed(path),
                            Err(e) => {
                                warn!("Could not move {} after extraction: {}", path.display(), e);
                                WorkerReport::Completed(path)
                            }
                        }
                    }
                    Err(e) => WorkerReport::Failed(path, e.to_string()),
                };
                let _ = tx.send(report).await;
            });
        }
        drop(tx);

        // single writer: every checkpoint mutation happens here
        while let Some(report) = rx.recv().await {
            match report {
                WorkerReport::Completed(path) => {
                    let key = path.display().to_string();
                    self.checkpoints.add_completed(&batch_id, &key)?;
                    outcome.successes.push(path);
                }
                WorkerReport::Failed(path, error) => {
                    let key = path.display().to_string();
                    self.checkpoints.add_failed(&batch_id, &key, &error)?;
                    warn!("Extraction failed for {}: {}", path.display(), error);
                    outcome.failures.push((path, error));
                }
                WorkerReport::Skipped(path) => {
                    info!("Skipped {} (batch canceled)", path.display());
                }
            }
        }

        info!(
            "Batch {} finished: {} ok, {} failed",
            batch_id,
            outcome.successes.len(),
            outcome.failures.len()
        );

        Ok(outcome)
    }
}
