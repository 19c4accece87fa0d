//! Log & Report Builder - per-company extraction logs and the
//! all-companies summary.
//!
//! Renders fixed-width text tables (overview, extracted/found status,
//! error list), verifies summed counts against the store's own totals,
//! and synchronizes on-disk file placement with the store: files whose
//! hash is persisted move to the persisted directory, files there whose
//! hash is gone move back to pending. Report wording stays in Swedish to
//! match what operators and the older tooling expect.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{EmbeddingConfig, ExtractionConfig};
use crate::models::{Company, ExtractionMeta};
use crate::services::store::{ChildCounts, EmbeddingStats, Store};
use crate::utils::{fingerprint_file, move_into_dir, ExtractResult};

// ============================================================================
// Fixed-width table rendering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

fn format_row(values: &[String], widths: &[usize], align: &[Align]) -> String {
    let cells: Vec<String> = values
        .iter()
        .zip(widths)
        .zip(align)
        .map(|((val, width), a)| match a {
            Align::Left => format!("{val:<width$}"),
            Align::Right => format!("{val:>width$}"),
        })
        .collect();
    format!("| {} |", cells.join(" | "))
}

fn format_separator(widths: &[usize]) -> String {
    let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    format!("+{}+", parts.join("+"))
}

/// Severity classification used in the error list
pub fn classify_severity(error_type: &str) -> &'static str {
    match error_type {
        // data missing outright
        "missing_table" | "empty_table" | "values_length_mismatch" => "Kritiskt",
        // data present but possibly incomplete
        "invalid_label" => "Medel",
        // cosmetic
        "first_value_not_null" | "missing_title" | "empty_content" => "Lag",
        _ => "Medel",
    }
}

fn format_status(extracted: i64, found: Option<usize>) -> String {
    match found {
        Some(n) => format!("{extracted}/{n}"),
        None => format!("{extracted}/?"),
    }
}

// ============================================================================
// Report data
// ============================================================================

/// One period row in the company log
#[derive(Debug, Clone)]
pub struct PeriodLogRow {
    pub period: String,
    pub tables: i64,
    pub sections: i64,
    pub charts: i64,
    pub meta: ExtractionMeta,
}

#[derive(Debug, Clone)]
struct ErrorRow {
    report: String,
    description: String,
    severity: &'static str,
}

/// Everything the pure renderer needs
#[derive(Debug, Clone)]
pub struct CompanyLogData {
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<PeriodLogRow>,
    pub db_counts: ChildCounts,
    pub embedding_stats: EmbeddingStats,
    pub embedding_model: String,
}

/// Result of the two-way pending/persisted sync
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub moved_to_persisted: usize,
    pub moved_to_pending: usize,
    pub already_correct: usize,
    pub not_in_store: usize,
}

// ============================================================================
// Service
// ============================================================================

pub struct ReportService {
    store: Store,
    extraction: ExtractionConfig,
    embedding: EmbeddingConfig,
}

impl ReportService {
    pub fn new(store: Store, extraction: ExtractionConfig, embedding: EmbeddingConfig) -> Self {
        Self {
            store,
            extraction,
            embedding,
        }
    }

    fn company_folder(&self, slug: &str) -> PathBuf {
        Path::new(&self.extraction.base_folder).join(slug)
    }

    /// Regenerate the extraction log for one company and sync its files.
    /// Returns the number of periods covered.
    pub async fn update_company_log(&self, slug: &str) -> ExtractResult<usize> {
        let Some(company) = self.store.get_company_by_slug(slug).await? else {
            warn!("Company not found in store: {}", slug);
            return Ok(0);
        };

        let data = self.collect_company_data(&company).await?;
        let period_count = data.rows.len();
        let rendered = render_company_log(&data);

        let log_dir = self
            .company_folder(slug)
            .join(&self.extraction.persisted_dir);
        std::fs::create_dir_all(&log_dir)?;
        let log_path = log_dir.join("extraction_log.txt");
        std::fs::write(&log_path, rendered)?;
        info!("Extraction log updated: {}", log_path.display());

        let sync = self.sync_files(&company).await?;
        if sync.moved_to_persisted > 0 {
            info!("Moved {} file(s) to {}/", sync.moved_to_persisted, self.extraction.persisted_dir);
        }
        if sync.moved_to_pending > 0 {
            info!("Moved {} file(s) back to {}/", sync.moved_to_pending, self.extraction.pending_dir);
        }

        Ok(period_count)
    }

    /// Gather per-period counts and stats from the store.
    /// Child counts come from one bulk query per kind, not one per period.
    async fn collect_company_data(&self, company: &Company) -> ExtractResult<CompanyLogData> {
        let periods = self.store.list_periods(&company.id).await?;
        let period_ids: Vec<String> = periods.iter().map(|p| p.id.clone()).collect();
        let counts = self.store.count_children_batch(&period_ids).await?;

        let rows = periods
            .iter()
            .map(|p| {
                let c = counts.get(&p.id).copied().unwrap_or_default();
                PeriodLogRow {
                    period: p.period_label(),
                    tables: c.tables,
                    sections: c.sections,
                    charts: c.charts,
                    meta: p.meta().unwrap_or_default(),
                }
            })
            .collect();

        Ok(CompanyLogData {
            company_name: company.name.clone(),
            generated_at: Utc::now(),
            rows,
            db_counts: self.store.total_counts(&company.id).await?,
            embedding_stats: self.store.embedding_stats(&company.id).await?,
            embedding_model: self.embedding.model.clone(),
        })
    }

    /// Write the all-companies summary log into the base folder
    pub async fn write_summary_log(&self) -> ExtractResult<PathBuf> {
        let companies = self.store.list_companies().await?;

        let mut out = String::new();
        out.push_str(&"#".repeat(80));
        out.push_str("\n# SUMMERINGSLOGG - ALLA BOLAG\n");
        out.push_str(&format!(
            "# Genererad: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&"#".repeat(80));
        out.push_str("\n\n");

        let widths = [20, 10, 10, 10, 8, 12, 10];
        let align = [
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Right,
            Align::Right,
            Align::Right,
            Align::Right,
        ];

        let mut grand = ChildCounts::default();
        let mut total_reports = 0usize;
        let mut total_cost = 0.0f64;
        let mut total_time = 0.0f64;
        let mut body_rows = Vec::new();

        for company in &companies {
            let periods = self.store.list_periods(&company.id).await?;
            let counts = self.store.total_counts(&company.id).await?;
            let (cost, time) = periods
                .iter()
                .filter_map(|p| p.meta())
                .fold((0.0, 0.0), |(c, t), m| {
                    (c + m.total_cost_sek, t + m.total_elapsed_seconds)
                });

            total_reports += periods.len();
            grand.tables += counts.tables;
            grand.sections += counts.sections;
            grand.charts += counts.charts;
            total_cost += cost;
            total_time += time;

            let name: String = company.name.chars().take(20).collect();
            body_rows.push(vec![
                name,
                periods.len().to_string(),
                counts.tables.to_string(),
                counts.sections.to_string(),
                counts.charts.to_string(),
                format!("{cost:.2}"),
                format!("{time:.1}"),
            ]);
        }

        out.push_str("SAMMANFATTNING:\n");
        out.push_str(&format!("  Bolag: {}\n", companies.len()));
        out.push_str(&format!("  Rapporter: {total_reports}\n"));
        out.push_str(&format!(
            "  Tabeller: {} | Sektioner: {} | Grafer: {}\n",
            grand.tables, grand.sections, grand.charts
        ));
        out.push_str(&format!(
            "  Kostnad: {total_cost:.2} SEK | Tid: {total_time:.1} sekunder\n\n"
        ));

        out.push_str("PER BOLAG:\n");
        out.push_str(&format_separator(&widths));
        out.push('\n');
        out.push_str(&format_row(
            &[
                "Bolag".into(),
                "Rapporter".into(),
                "Tabeller".into(),
                "Sektioner".into(),
                "Grafer".into(),
                "Kostnad".into(),
                "Tid (s)".into(),
            ],
            &widths,
            &align,
        ));
        out.push('\n');
        out.push_str(&format_separator(&widths));
        out.push('\n');
        for row in body_rows {
            out.push_str(&format_row(&row, &widths, &align));
            out.push('\n');
        }
        out.push_str(&format_separator(&widths));
        out.push('\n');
        out.push_str(&format_row(
            &[
                "TOTALT".into(),
                total_reports.to_string(),
                grand.tables.to_string(),
                grand.sections.to_string(),
                grand.charts.to_string(),
                format!("{total_cost:.2}"),
                format!("{total_time:.1}"),
            ],
            &widths,
            &align,
        ));
        out.push('\n');
        out.push_str(&format_separator(&widths));
        out.push('\n');

        std::fs::create_dir_all(&self.extraction.base_folder)?;
        let path = Path::new(&self.extraction.base_folder).join("SUMMARY_LOG.txt");
        std::fs::write(&path, out)?;
        info!("Summary log written: {}", path.display());
        Ok(path)
    }

    /// Two-way sync between directory layout and store contents, driven
    /// by pdf-hash equality.
    pub async fn sync_files(&self, company: &Company) -> ExtractResult<SyncResult> {
        let folder = self.company_folder(&company.slug);
        let pending = folder.join(&self.extraction.pending_dir);
        let persisted = folder.join(&self.extraction.persisted_dir);
        std::fs::create_dir_all(&pending)?;
        std::fs::create_dir_all(&persisted)?;

        let stored_hashes = self.store.company_pdf_hashes(&company.id).await?;
        let mut result = SyncResult::default();

        // pending → persisted when the store knows the hash
        for entry in pdf_files(&pending)? {
            match fingerprint_file(&entry) {
                Ok(hash) if stored_hashes.contains(&hash) => {
                    move_into_dir(&entry, &persisted)?;
                    result.moved_to_persisted += 1;
                }
                Ok(_) => result.not_in_store += 1,
                Err(e) => warn!("Could not hash {}: {}", entry.display(), e),
            }
        }

        // persisted → pending when the store no longer knows the hash
        for entry in pdf_files(&persisted)? {
            match fingerprint_file(&entry) {
                Ok(hash) if stored_hashes.contains(&hash) => result.already_correct += 1,
                Ok(_) => {
                    move_into_dir(&entry, &pending)?;
                    result.moved_to_pending += 1;
                }
                Err(e) => warn!("Could not hash {}: {}", entry.display(), e),
            }
        }

        Ok(result)
    }
}

fn pdf_files(dir: &Path) -> ExtractResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// Pure rendering
// ============================================================================

fn collect_errors(rows: &[PeriodLogRow], company_name: &str) -> Vec<ErrorRow> {
    let mut errors = Vec::new();

    for row in rows {
        let report = format!("{} {}", row.period, company_name);

        for mt in &row.meta.missing_tables {
            errors.push(ErrorRow {
                report: report.clone(),
                description: format!(
                    "SAKNAD: '{}' (sida {})",
                    mt.table_title,
                    mt.page.map(|p| p.to_string()).unwrap_or_else(|| "?".into())
                ),
                severity: classify_severity("missing_table"),
            });
        }
        for err in &row.meta.validation.tables.errors {
            errors.push(ErrorRow {
                report: report.clone(),
                description: format!("FEL: '{}' - {}", err.table_title, err.message),
                severity: classify_severity(&err.error_type),
            });
        }
        for warn in &row.meta.validation.sections.warnings {
            errors.push(ErrorRow {
                report: report.clone(),
                description: format!("VARNING: Sektion '{}' - {}", err_title(warn), warn.message),
                severity: classify_severity(&warn.error_type),
            });
        }
    }
    errors
}

fn err_title(issue: &crate::models::ValidationIssue) -> &str {
    if issue.table_title.is_empty() {
        &issue.table_id
    } else {
        &issue.table_title
    }
}

/// Render the full company log as fixed-width text
pub fn render_company_log(data: &CompanyLogData) -> String {
    let mut out = String::new();

    out.push_str(&"#".repeat(80));
    out.push_str(&format!(
        "\n# EXTRAKTIONSLOGG: {}\n",
        data.company_name.to_uppercase()
    ));
    out.push_str(&format!(
        "# Genererad: {}\n",
        data.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&"#".repeat(80));
    out.push_str("\n\n");

    let total_tables: i64 = data.rows.iter().map(|r| r.tables).sum();
    let total_sections: i64 = data.rows.iter().map(|r| r.sections).sum();
    let total_charts: i64 = data.rows.iter().map(|r| r.charts).sum();
    let total_cost: f64 = data.rows.iter().map(|r| r.meta.total_cost_sek).sum();
    let total_time: f64 = data.rows.iter().map(|r| r.meta.total_elapsed_seconds).sum();

    out.push_str("SAMMANFATTNING:\n");
    out.push_str(&format!("  Rapporter: {}\n", data.rows.len()));
    out.push_str(&format!(
        "  Tabeller: {total_tables} | Sektioner: {total_sections} | Grafer: {total_charts}\n"
    ));
    out.push_str(&format!(
        "  Kostnad: {total_cost:.2} SEK | Tid: {total_time:.1} sekunder\n\n"
    ));

    // ===== Table 1: overview =====
    let widths = [9, 8, 9, 6, 10, 8];
    let align = [
        Align::Left,
        Align::Right,
        Align::Right,
        Align::Right,
        Align::Right,
        Align::Right,
    ];

    out.push_str("RAPPORTER - OVERSIKT:\n");
    out.push_str(&format_separator(&widths));
    out.push('\n');
    out.push_str(&format_row(
        &[
            "Period".into(),
            "Tabeller".into(),
            "Sektioner".into(),
            "Grafer".into(),
            "Kostnad".into(),
            "Tid (s)".into(),
        ],
        &widths,
        &align,
    ));
    out.push('\n');
    out.push_str(&format_separator(&widths));
    out.push('\n');

    for row in &data.rows {
        out.push_str(&format_row(
            &[
                row.period.clone(),
                row.tables.to_string(),
                row.sections.to_string(),
                row.charts.to_string(),
                format!("{:.2}", row.meta.total_cost_sek),
                format!("{:.1}", row.meta.total_elapsed_seconds),
            ],
            &widths,
            &align,
        ));
        out.push('\n');
    }
    out.push_str(&format_separator(&widths));
    out.push('\n');
    out.push_str(&format_row(
        &[
            "TOTALT".into(),
            total_tables.to_string(),
            total_sections.to_string(),
            total_charts.to_string(),
            format!("{total_cost:.2}"),
            format!("{total_time:.1}"),
        ],
        &widths,
        &align,
    ));
    out.push('\n');
    out.push_str(&format_separator(&widths));
    out.push('\n');

    // ===== Table 2: extracted/found status from pass 1 counts =====
    out.push_str("\n\nRAPPORTER - STATUS (extraherade/hittade):\n");
    let widths = [9, 12, 14, 12];
    let align = [Align::Left, Align::Right, Align::Right, Align::Right];

    out.push_str(&format_separator(&widths));
    out.push('\n');
    out.push_str(&format_row(
        &[
            "Period".into(),
            "Tabeller".into(),
            "Sektioner".into(),
            "Grafer".into(),
        ],
        &widths,
        &align,
    ));
    out.push('\n');
    out.push_str(&format_separator(&widths));
    out.push('\n');

    let mut found_tables = 0usize;
    let mut found_sections = 0usize;
    let mut found_charts = 0usize;
    let mut has_pass1_data = false;

    for row in &data.rows {
        let counts = &row.meta.pass1_counts;
        // zero pass 1 counts on a non-empty period means older data
        // without a structure map
        let known = counts.tables + counts.sections + counts.charts > 0
            || (row.tables + row.sections + row.charts == 0);
        if known {
            has_pass1_data = true;
            found_tables += counts.tables;
            found_sections += counts.sections;
            found_charts += counts.charts;
        }

        out.push_str(&format_row(
            &[
                row.period.clone(),
                format_status(row.tables, known.then_some(counts.tables)),
                format_status(row.sections, known.then_some(counts.sections)),
                format_status(row.charts, known.then_some(counts.charts)),
            ],
            &widths,
            &align,
        ));
        out.push('\n');
    }
    out.push_str(&format_separator(&widths));
    out.push('\n');
    out.push_str(&format_row(
        &[
            "TOTALT".into(),
            format_status(total_tables, has_pass1_data.then_some(found_tables)),
            format_status(total_sections, has_pass1_data.then_some(found_sections)),
            format_status(total_charts, has_pass1_data.then_some(found_charts)),
        ],
        &widths,
        &align,
    ));
    out.push('\n');
    out.push_str(&format_separator(&widths));
    out.push('\n');

    // ===== Error list =====
    let errors = collect_errors(&data.rows, &data.company_name);
    if errors.is_empty() {
        out.push_str("\n\nINGA FEL REGISTRERADE.\n");
    } else {
        out.push_str("\n\nFEL OCH VARNINGAR:\n");
        let widths = [22, 55, 10];
        let align = [Align::Left, Align::Left, Align::Left];

        out.push_str(&format_separator(&widths));
        out.push('\n');
        out.push_str(&format_row(
            &["Rapport".into(), "Beskrivning".into(), "Bedomning".into()],
            &widths,
            &align,
        ));
        out.push('\n');
        out.push_str(&format_separator(&widths));
        out.push('\n');

        for err in &errors {
            let mut description = err.description.clone();
            if description.chars().count() > 55 {
                description = description.chars().take(52).collect::<String>() + "...";
            }
            let report: String = err.report.chars().take(22).collect();
            out.push_str(&format_row(
                &[report, description, err.severity.to_string()],
                &widths,
                &align,
            ));
            out.push('\n');
        }
        out.push_str(&format_separator(&widths));
        out.push('\n');
    }

    // ===== Verification against the store =====
    out.push_str("\n\nVERIFIERING (logg vs databas):\n");
    let mut drift = false;
    if total_tables != data.db_counts.tables {
        out.push_str(&format!(
            "  [AVVIKELSE] Tabeller: logg={}, databas={}\n",
            total_tables, data.db_counts.tables
        ));
        drift = true;
    }
    if total_sections != data.db_counts.sections {
        out.push_str(&format!(
            "  [AVVIKELSE] Sektioner: logg={}, databas={}\n",
            total_sections, data.db_counts.sections
        ));
        drift = true;
    }
    if total_charts != data.db_counts.charts {
        out.push_str(&format!(
            "  [AVVIKELSE] Grafer: logg={}, databas={}\n",
            total_charts, data.db_counts.charts
        ));
        drift = true;
    }
    if !drift {
        out.push_str(&format!(
            "  [OK] Tabeller: {total_tables} | Sektioner: {total_sections} | Grafer: {total_charts}\n"
        ));
    }

    // ===== Embedding coverage =====
    let emb = &data.embedding_stats;
    out.push_str(&format!("\nEMBEDDINGS (modell: {}):\n", data.embedding_model));
    if emb.total_sections == 0 {
        out.push_str("  Inga sektioner att generera embeddings for.\n");
    } else if emb.with_embedding == emb.total_sections {
        out.push_str(&format!(
            "  [OK] {}/{} sektioner har embeddings\n",
            emb.with_embedding, emb.total_sections
        ));
    } else {
        out.push_str(&format!(
            "  [SAKNAS] {}/{} sektioner har embeddings ({} saknas)\n",
            emb.with_embedding,
            emb.total_sections,
            emb.total_sections - emb.with_embedding
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MissingTable, Pass1Counts, ValidationIssue};

    fn sample_data() -> CompanyLogData {
        let mut meta = ExtractionMeta::default();
        meta.total_cost_sek = 4.52;
        meta.total_elapsed_seconds = 93.4;
        meta.pass1_counts = Pass1Counts {
            tables: 4,
            sections: 6,
            charts: 2,
        };
        meta.missing_tables = vec![MissingTable {
            table_id: "table_4".into(),
            table_title: "Kassaflödesanalys".into(),
            page: Some(9),
        }];
        meta.validation.tables.errors = vec![ValidationIssue {
            table_id: "table_2".into(),
            table_title: "Segment".into(),
            error_type: "invalid_label".into(),
            message: "invalid label '1'".into(),
            row_index: Some(1),
        }];

        CompanyLogData {
            company_name: "Vitrolife".into(),
            generated_at: DateTime::parse_from_rfc3339("2025-02-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            rows: vec![PeriodLogRow {
                period: "Q3 2024".into(),
                tables: 3,
                sections: 6,
                charts: 2,
                meta,
            }],
            db_counts: ChildCounts {
                tables: 3,
                sections: 6,
                charts: 2,
            },
            embedding_stats: EmbeddingStats {
                total_sections: 6,
                with_embedding: 4,
            },
            embedding_model: "voyage-4".into(),
        }
    }

    #[test]
    fn severity_classification() {
        assert_eq!(classify_severity("missing_table"), "Kritiskt");
        assert_eq!(classify_severity("empty_table"), "Kritiskt");
        assert_eq!(classify_severity("values_length_mismatch"), "Kritiskt");
        assert_eq!(classify_severity("invalid_label"), "Medel");
        assert_eq!(classify_severity("first_value_not_null"), "Lag");
        assert_eq!(classify_severity("missing_title"), "Lag");
        assert_eq!(classify_severity("something_new"), "Medel");
    }

    #[test]
    fn renders_overview_and_status() {
        let log = render_company_log(&sample_data());
        assert!(log.contains("EXTRAKTIONSLOGG: VITROLIFE"));
        assert!(log.contains("Rapporter: 1"));
        // extracted/found from pass 1 counts
        assert!(log.contains("3/4"));
        assert!(log.contains("6/6"));
        assert!(log.contains("2/2"));
    }

    #[test]
    fn renders_error_list_with_severities() {
        let log = render_company_log(&sample_data());
        assert!(log.contains("FEL OCH VARNINGAR:"));
        assert!(log.contains("SAKNAD: 'Kassaflödesanalys' (sida 9)"));
        assert!(log.contains("Kritiskt"));
        assert!(log.contains("Medel"));
    }

    #[test]
    fn reports_no_drift_when_counts_match() {
        let log = render_company_log(&sample_data());
        assert!(log.contains("[OK] Tabeller: 3 | Sektioner: 6 | Grafer: 2"));
        assert!(!log.contains("AVVIKELSE"));
    }

    #[test]
    fn reports_drift_against_store_counts() {
        let mut data = sample_data();
        data.db_counts.tables = 5;
        let log = render_company_log(&data);
        assert!(log.contains("[AVVIKELSE] Tabeller: logg=3, databas=5"));
    }

    #[test]
    fn reports_missing_embeddings() {
        let log = render_company_log(&sample_data());
        assert!(log.contains("[SAKNAS] 4/6 sektioner har embeddings (2 saknas)"));
    }

    #[test]
    fn fixed_width_rows_align() {
        let widths = [5, 3];
        let align = [Align::Left, Align::Right];
        let row = format_row(&["ab".into(), "7".into()], &widths, &align);
        assert_eq!(row, "| ab    |   7 |");
        assert_eq!(format_separator(&widths), "+-------+-----+");
    }
}
