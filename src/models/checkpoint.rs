//! Batch checkpoint records, persisted as one JSON document keyed by
//! batch id so a crashed batch can resume where it stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One failed file inside a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Progress record for one batch
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointData {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedFile>,
    #[serde(default)]
    pub last_file: String,
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_files: usize,
    pub batch_started: Option<DateTime<Utc>>,
}

impl CheckpointData {
    /// A batch is resumable while files remain unprocessed
    pub fn is_resumable(&self) -> bool {
        self.total_files > 0 && self.completed.len() + self.failed.len() < self.total_files
    }

    pub fn remaining(&self) -> usize {
        self.total_files
            .saturating_sub(self.completed.len() + self.failed.len())
    }
}

/// Summary row for `databok batches`
#[derive(Debug, Clone, Serialize)]
pub struct ResumableBatch {
    pub batch_id: String,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub remaining: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub batch_started: Option<DateTime<Utc>>,
}
