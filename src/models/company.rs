//! Company identity for a reporting entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A company as stored in the `companies` table.
///
/// Created on first reference by the batch orchestrator; the core never
/// deletes companies.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    /// URL-safe slug, unique. Doubles as the company folder name on disk.
    pub slug: String,
    pub created_at: DateTime<Utc>,
}
