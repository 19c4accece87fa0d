//! Periods: one quarterly report instance per company, plus the extraction
//! metadata blob persisted alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::report::{Chart, NumberFormat, ReportMetadata, ReportTable, Section};

// ============================================================================
// Database row
// ============================================================================

/// A period as stored in the `periods` table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub company_id: String,
    pub quarter: i64,
    pub year: i64,
    pub source_file: String,
    /// First 12 hex chars of the SHA-256 digest of the PDF bytes
    pub pdf_hash: String,
    pub currency: Option<String>,
    pub language: Option<String>,
    /// JSON-serialized [`ExtractionMeta`]
    pub extraction_meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Period {
    /// Decode the extraction metadata blob. Older rows may carry none.
    pub fn meta(&self) -> Option<ExtractionMeta> {
        self.extraction_meta
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn period_label(&self) -> String {
        format!("Q{} {}", self.quarter, self.year)
    }
}

// ============================================================================
// Period payload (pipeline output, store input)
// ============================================================================

/// The full set of extracted content for one period. Persisted atomically:
/// either every row below lands in the store or none do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodPayload {
    pub quarter: i64,
    pub year: i64,
    pub metadata: ReportMetadata,
    pub tables: Vec<ReportTable>,
    pub sections: Vec<Section>,
    pub charts: Vec<Chart>,
    pub extraction_meta: ExtractionMeta,
}

// ============================================================================
// Extraction metadata
// ============================================================================

/// Token/cost/timing record for one pass
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassStats {
    pub pass: u8,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub cost_sek: f64,
}

/// Stats for the single repair call, zeroed when no repair ran
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepairStats {
    pub repair_count: u32,
    pub tables_repaired: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub cost_sek: f64,
}

/// Element counts found by pass 1, used by the status report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pass1Counts {
    pub tables: usize,
    pub sections: usize,
    pub charts: usize,
}

/// A table pass 1 found but the pipeline never materialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingTable {
    pub table_id: String,
    pub table_title: String,
    pub page: Option<i64>,
}

/// One validation finding, serialized into the metadata blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub table_id: String,
    pub table_title: String,
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
}

/// Validation summary over tables
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TableValidationSummary {
    pub is_valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    #[serde(default)]
    pub errors: Vec<ValidationIssue>,
}

/// Validation summary over sections (warnings only)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SectionValidationSummary {
    pub warning_count: usize,
    #[serde(default)]
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationSummary {
    pub tables: TableValidationSummary,
    pub sections: SectionValidationSummary,
}

/// Everything the pipeline records about how a period was extracted.
/// Stored as JSON in `periods.extraction_meta`; downstream consumers
/// (report builder, external tooling) treat it as the ground truth for
/// costs and residual issues.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionMeta {
    pub passes: Vec<PassStats>,
    pub repair: RepairStats,
    pub total_cost_sek: f64,
    pub total_elapsed_seconds: f64,
    pub pass1_counts: Pass1Counts,
    #[serde(default)]
    pub missing_tables: Vec<MissingTable>,
    pub validation: ValidationSummary,
    pub number_format: NumberFormat,
}

impl ExtractionMeta {
    pub fn total_input_tokens(&self) -> u64 {
        self.passes.iter().map(|p| p.input_tokens).sum::<u64>() + self.repair.input_tokens
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.passes.iter().map(|p| p.output_tokens).sum::<u64>() + self.repair.output_tokens
    }
}
