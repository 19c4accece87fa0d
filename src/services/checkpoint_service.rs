//! Checkpoint Store - atomic on-disk batch progress.
//!
//! All batches share one JSON document keyed by batch id, which makes
//! stale batches inspectable after the fact. Writes go through a sibling
//! temp file plus rename so a crash mid-write cannot corrupt the record.
//! Only the orchestrator task calls the mutating methods; workers report
//! over a channel instead of touching the file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::models::{CheckpointData, FailedFile, ResumableBatch};
use crate::utils::{atomic_write, ExtractResult};

#[derive(Clone)]
pub struct CheckpointService {
    path: PathBuf,
}

impl CheckpointService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deterministic batch id: `{prefix}_{company}_{yyyy-mm-dd}`.
    /// Re-running the same company on the same day resumes its batch.
    pub fn batch_id(prefix: &str, company_slug: &str) -> String {
        let date = Utc::now().format("%Y-%m-%d");
        format!("{prefix}_{company_slug}_{date}")
    }

    /// All checkpoints in the document. A missing or corrupt file reads
    /// as empty rather than failing the batch.
    pub fn load_all(&self) -> BTreeMap<String, CheckpointData> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!("Checkpoint file {} unreadable: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    pub fn load(&self, batch_id: &str) -> Option<CheckpointData> {
        self.load_all().remove(batch_id)
    }

    /// Paths already processed in this batch, used to skip on resume
    pub fn completed_files(&self, batch_id: &str) -> HashSet<String> {
        self.load(batch_id)
            .map(|c| c.completed.into_iter().collect())
            .unwrap_or_default()
    }

    fn save(&self, batch_id: &str, data: CheckpointData) -> ExtractResult<()> {
        let mut all = self.load_all();
        all.insert(batch_id.to_string(), data);
        let json = serde_json::to_string_pretty(&all)?;
        atomic_write(&self.path, &json)
    }

    /// Initialize (or refresh) a batch entry at dispatch time
    pub fn start_batch(&self, batch_id: &str, total_files: usize) -> ExtractResult<()> {
        let mut data = self.load(batch_id).unwrap_or_default();
        data.total_files = total_files;
        if data.batch_started.is_none() {
            data.batch_started = Some(Utc::now());
        }
        data.last_update = Some(Utc::now());
        self.save(batch_id, data)
    }

    pub fn add_completed(&self, batch_id: &str, file_path: &str) -> ExtractResult<()> {
        let mut data = self.load(batch_id).unwrap_or_default();
        if !data.completed.iter().any(|p| p == file_path) {
            data.completed.push(file_path.to_string());
        }
        // a retry that eventually succeeded is no longer a failure
        data.failed.retain(|f| f.path != file_path);
        data.last_file = file_path.to_string();
        data.last_update = Some(Utc::now());
        self.save(batch_id, data)
    }

    pub fn add_failed(&self, batch_id: &str, file_path: &str, error: &str) -> ExtractResult<()> {
        let mut data = self.load(batch_id).unwrap_or_default();
        // completed and failed stay disjoint
        let already_completed = data.completed.iter().any(|p| p == file_path);
        if !already_completed && !data.failed.iter().any(|f| f.path == file_path) {
            data.failed.push(FailedFile {
                path: file_path.to_string(),
                error: error.to_string(),
                timestamp: Utc::now(),
            });
        }
        data.last_file = file_path.to_string();
        data.last_update = Some(Utc::now());
        self.save(batch_id, data)
    }

    pub fn clear(&self, batch_id: &str) -> ExtractResult<()> {
        let mut all = self.load_all();
        if all.remove(batch_id).is_some() {
            let json = serde_json::to_string_pretty(&all)?;
            atomic_write(&self.path, &json)?;
        }
        Ok(())
    }

    /// Batches with files left to process
    pub fn resumable_batches(&self) -> Vec<ResumableBatch> {
        self.load_all()
            .into_iter()
            .filter(|(_, c)| c.is_resumable())
            .map(|(batch_id, c)| ResumableBatch {
                batch_id,
                completed: c.completed.len(),
                failed: c.failed.len(),
                total: c.total_files,
                remaining: c.remaining(),
                last_update: c.last_update,
                batch_started: c.batch_started,
            })
            .collect()
    }
}
