//! Extraction Pipeline - the per-PDF state machine.
//!
//! ```text
//! NEW → CACHE_HIT ─────────────────────────────┐
//!       │                                       │
//!       └→ PASS1 → {PASS2 ∥ PASS3} → REPAIR →  │
//!          VALIDATE → PERSIST → DONE ──────────┤
//!                            │                  │
//!                            └ FAIL ────────────┘
//! ```
//!
//! Pass 1 strictly happens-before passes 2 and 3; repair happens-after
//! pass 2; persistence happens-after repair. Transient errors are retried
//! here (exponential backoff, capped attempts) under a policy callback so
//! non-interactive callers can pass a pure function.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::models::{
    Company, ExtractionMeta, Pass1Counts, PeriodPayload, SectionValidationSummary,
    TableValidationSummary, ValidationSummary,
};
use crate::services::passes::PassRunner;
use crate::services::repair::validate_and_repair;
use crate::services::store::Store;
use crate::services::validation::validate_sections;
use crate::utils::{fingerprint, ExtractError, ExtractResult};

static QUARTER_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)q(\d)[_-]?(\d{4})").unwrap());
static YEAR_QUARTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d{4})[_-]?q(\d)").unwrap());

/// Progress event codes surfaced per PDF
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Cached,
    Extracting,
    Pass1,
    Pass23,
    Validating,
    Done {
        input_tokens: u64,
        output_tokens: u64,
        cost_sek: f64,
    },
    Failed(String),
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Extracting => write!(f, "extracting"),
            Self::Pass1 => write!(f, "pass_1"),
            Self::Pass23 => write!(f, "pass_2_3"),
            Self::Validating => write!(f, "validating"),
            Self::Done { .. } => write!(f, "done"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Callback receiving progress events per PDF
pub type ProgressCallback = Arc<dyn Fn(&Path, &ProgressEvent) + Send + Sync>;

/// Retry decision: `should_retry(attempt, error)`. The CLI installs an
/// interactive prompt here; batch callers pass a pure function.
pub type RetryPolicy = Arc<dyn Fn(u32, &ExtractError) -> bool + Send + Sync>;

/// Parse quarter/year out of a filename stem.
///
/// Accepts `Q<d>-<yyyy>` and `<yyyy>-Q<d>` (case-insensitive, `-` or `_`
/// separators, optionally none), e.g. `acme-2024-q3-sv` or `q1_2025`.
pub fn parse_period_from_filename(stem: &str) -> Option<(i64, i64)> {
    if let Some(caps) = QUARTER_YEAR.captures(stem) {
        let quarter: i64 = caps[1].parse().ok()?;
        let year: i64 = caps[2].parse().ok()?;
        if (1..=4).contains(&quarter) {
            return Some((quarter, year));
        }
    }
    if let Some(caps) = YEAR_QUARTER.captures(stem) {
        let year: i64 = caps[1].parse().ok()?;
        let quarter: i64 = caps[2].parse().ok()?;
        if (1..=4).contains(&quarter) {
            return Some((quarter, year));
        }
    }
    None
}

pub struct ExtractionPipeline {
    runner: PassRunner,
    store: Store,
    max_attempts: u32,
}

impl ExtractionPipeline {
    pub fn new(runner: PassRunner, store: Store, max_attempts: u32) -> Self {
        Self {
            runner,
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Extract one PDF and persist the resulting period.
    ///
    /// Returns the persisted payload. On a cache hit (same company,
    /// quarter, year and content hash already stored) the stored payload
    /// comes back without any LLM call.
    pub async fn extract_pdf(
        &self,
        pdf_path: &Path,
        company: &Company,
        use_cache: bool,
        on_progress: Option<&ProgressCallback>,
        retry_policy: Option<&RetryPolicy>,
    ) -> ExtractResult<PeriodPayload> {
        let emit = |event: ProgressEvent| {
            if let Some(cb) = on_progress {
                cb(pdf_path, &event);
            }
        };

        let pdf_bytes = std::fs::read(pdf_path)?;
        let pdf_hash = fingerprint(&pdf_bytes);
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let filename_period = parse_period_from_filename(&stem);

        // Cache check needs a known quarter/year; without one in the
        // filename extraction still runs and pass 1 supplies the period.
        if use_cache {
            if let Some((quarter, year)) = filename_period {
                if self
                    .store
                    .find_period(&company.id, quarter, year, &pdf_hash)
                    .await?
                    .is_some()
                {
                    emit(ProgressEvent::Cached);
                    info!("Cache hit for {} (Q{} {})", stem, quarter, year);
                    if let Some(payload) =
                        self.store.load_period(&company.id, quarter, year).await?
                    {
                        return Ok(payload);
                    }
                }
            }
        }

        let pdf_base64 = Arc::new(BASE64.encode(&pdf_bytes));
        drop(pdf_bytes);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .extract_once(pdf_path, company, &pdf_base64, &pdf_hash, filename_period, &emit)
                .await
            {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    let may_retry = e.is_retryable() && attempt < self.max_attempts;
                    let wants_retry = may_retry
                        && retry_policy.map_or(true, |policy| policy(attempt, &e));

                    if !wants_retry {
                        emit(ProgressEvent::Failed(e.to_string()));
                        return Err(e);
                    }

                    let wait = 2u64.pow(attempt - 1);
                    warn!(
                        "Extraction of {} failed (attempt {}/{}): {}. Retrying in {}s",
                        stem, attempt, self.max_attempts, e, wait
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
                }
            }
        }
    }

    /// One full pass sequence: structure → tables ∥ narrative → repair →
    /// validate → persist
    async fn extract_once(
        &self,
        pdf_path: &Path,
        company: &Company,
        pdf_base64: &Arc<String>,
        pdf_hash: &str,
        filename_period: Option<(i64, i64)>,
        emit: &impl Fn(ProgressEvent),
    ) -> ExtractResult<PeriodPayload> {
        let extraction_start = Instant::now();
        emit(ProgressEvent::Extracting);

        // === Pass 1: structure ===
        emit(ProgressEvent::Pass1);
        let pass_1 = self.runner.run_structure(pdf_base64).await?;
        let structure = pass_1.data.clone();

        // persistence needs a quarter/year from somewhere
        let (quarter, year) = filename_period
            .or_else(|| structure.metadata.quarter.zip(structure.metadata.year))
            .filter(|(q, y)| (1..=4).contains(q) && (2000..=2100).contains(y))
            .ok_or_else(|| ExtractError::MissingPeriod(pdf_path.display().to_string()))?;

        // === Pass 2 ∥ Pass 3 ===
        emit(ProgressEvent::Pass23);
        let tables_task = {
            let runner = self.runner.clone();
            let pdf = Arc::clone(pdf_base64);
            let structure = structure.clone();
            tokio::spawn(async move { runner.run_tables(&pdf, &structure).await })
        };
        let narrative_task = {
            let runner = self.runner.clone();
            let pdf = Arc::clone(pdf_base64);
            let structure = structure.clone();
            tokio::spawn(async move { runner.run_narrative(&pdf, &structure).await })
        };

        let (tables_result, narrative_result) = tokio::join!(tables_task, narrative_task);
        let pass_2 = tables_result
            .map_err(|e| ExtractError::Transport(format!("pass 2 task failed: {e}")))??;
        let pass_3 = narrative_result
            .map_err(|e| ExtractError::Transport(format!("pass 3 task failed: {e}")))??;
        let pass_stats = vec![pass_1.stats(), pass_2.stats(), pass_3.stats()];

        // === Repair & validation ===
        emit(ProgressEvent::Validating);
        let number_format = structure.metadata.number_format;
        let repair = validate_and_repair(
            &self.runner,
            pdf_base64,
            &structure,
            pass_2.data.tables.clone(),
            number_format,
        )
        .await;

        let mut tables = repair.tables;
        for table in &mut tables {
            table.normalize_row_order();
        }
        let sections = pass_3.data.sections;
        let charts = pass_2.data.charts;
        let section_validation = validate_sections(&sections);

        if !repair.validation.is_valid() {
            // residual errors are recorded in the metadata blob, not fatal
            warn!(
                "{}: {} validation error(s) remain after repair",
                pdf_path.display(),
                repair.validation.errors.len()
            );
        }

        // === Metadata blob ===
        let total_cost_sek =
            pass_stats.iter().map(|p| p.cost_sek).sum::<f64>() + repair.stats.cost_sek;
        let extraction_meta = ExtractionMeta {
            pass1_counts: Pass1Counts {
                tables: structure.structure_map.tables.len(),
                sections: structure.structure_map.sections.len(),
                charts: structure.structure_map.charts.len(),
            },
            passes: pass_stats,
            repair: repair.stats,
            total_cost_sek,
            total_elapsed_seconds: extraction_start.elapsed().as_secs_f64(),
            missing_tables: repair.missing_after,
            validation: ValidationSummary {
                tables: TableValidationSummary {
                    is_valid: repair.validation.is_valid(),
                    error_count: repair.validation.errors.len(),
                    warning_count: repair.validation.warnings.len(),
                    errors: repair.validation.errors.clone(),
                },
                sections: SectionValidationSummary {
                    warning_count: section_validation.warnings.len(),
                    warnings: section_validation.warnings.clone(),
                },
            },
            number_format,
        };

        let payload = PeriodPayload {
            quarter,
            year,
            metadata: structure.metadata.clone(),
            tables,
            sections,
            charts,
            extraction_meta,
        };

        // === Persist (atomic replace) ===
        self.store
            .save_period_atomic(
                &company.id,
                &payload,
                pdf_hash,
                &pdf_path.display().to_string(),
            )
            .await?;

        let meta = &payload.extraction_meta;
        info!(
            "{} done: {:.1}s | {}+{} tokens | {:.2} SEK | {} tables, {} sections, {} charts",
            pdf_path.display(),
            meta.total_elapsed_seconds,
            meta.total_input_tokens(),
            meta.total_output_tokens(),
            meta.total_cost_sek,
            payload.tables.len(),
            payload.sections.len(),
            payload.charts.len()
        );

        emit(ProgressEvent::Done {
            input_tokens: meta.total_input_tokens(),
            output_tokens: meta.total_output_tokens(),
            cost_sek: meta.total_cost_sek,
        });

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quarter_first_filenames() {
        assert_eq!(parse_period_from_filename("rapport_q1_2025"), Some((1, 2025)));
        assert_eq!(parse_period_from_filename("Q4-2023_sv"), Some((4, 2023)));
        assert_eq!(parse_period_from_filename("q32024"), Some((3, 2024)));
    }

    #[test]
    fn parses_year_first_filenames() {
        assert_eq!(parse_period_from_filename("acme-2024-q3-sv"), Some((3, 2024)));
        assert_eq!(parse_period_from_filename("2025_Q2"), Some((2, 2025)));
    }

    #[test]
    fn rejects_filenames_without_period() {
        assert_eq!(parse_period_from_filename("arsredovisning-2024"), None);
        assert_eq!(parse_period_from_filename("rapport"), None);
        // quarter digit out of range
        assert_eq!(parse_period_from_filename("q7-2024"), None);
    }

    #[test]
    fn progress_event_codes_are_stable() {
        assert_eq!(ProgressEvent::Cached.to_string(), "cached");
        assert_eq!(ProgressEvent::Pass1.to_string(), "pass_1");
        assert_eq!(ProgressEvent::Pass23.to_string(), "pass_2_3");
        assert_eq!(
            ProgressEvent::Failed("timeout".into()).to_string(),
            "failed: timeout"
        );
        let done = ProgressEvent::Done {
            input_tokens: 1,
            output_tokens: 2,
            cost_sek: 0.1,
        };
        assert_eq!(done.to_string(), "done");
    }
}
