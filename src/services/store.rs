//! Store - durable persistence for companies, periods and their children.
//!
//! The period is the unit of atomicity: `save_period_atomic` replaces any
//! prior period for the same (company, quarter, year) and writes every
//! child row inside one transaction, so a crash can never leave orphans
//! or a half-written period behind.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Chart, Company, Period, PeriodPayload, ReportTable, Section, TableKind, TableRow,
};
use crate::utils::{slugify, ExtractResult};

/// Child-row counts for one period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildCounts {
    pub tables: i64,
    pub sections: i64,
    pub charts: i64,
}

/// Embedding coverage for a company
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStats {
    pub total_sections: i64,
    pub with_embedding: i64,
}

/// A section row still lacking its vector
#[derive(Debug, Clone)]
pub struct SectionForEmbedding {
    pub row_id: i64,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Companies
    // ========================================================================

    /// Find a company by name (via its slug) or create it
    pub async fn upsert_company(&self, name: &str) -> ExtractResult<Company> {
        let slug = slugify(name);

        if let Some(existing) =
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE slug = ?")
                .bind(&slug)
                .fetch_optional(&self.pool)
                .await?
        {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO companies (id, name, slug) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(&slug)
            .execute(&self.pool)
            .await?;

        debug!("Created company '{}' ({})", name, slug);

        let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(company)
    }

    pub async fn get_company_by_slug(&self, slug: &str) -> ExtractResult<Option<Company>> {
        let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(company)
    }

    pub async fn list_companies(&self) -> ExtractResult<Vec<Company>> {
        let companies = sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(companies)
    }

    // ========================================================================
    // Periods
    // ========================================================================

    /// Exact cache-hit lookup on (company, quarter, year, pdf_hash)
    pub async fn find_period(
        &self,
        company_id: &str,
        quarter: i64,
        year: i64,
        pdf_hash: &str,
    ) -> ExtractResult<Option<Period>> {
        let period = sqlx::query_as::<_, Period>(
            "SELECT * FROM periods WHERE company_id = ? AND quarter = ? AND year = ? AND pdf_hash = ?",
        )
        .bind(company_id)
        .bind(quarter)
        .bind(year)
        .bind(pdf_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(period)
    }

    /// All periods of a company, newest first
    pub async fn list_periods(&self, company_id: &str) -> ExtractResult<Vec<Period>> {
        let periods = sqlx::query_as::<_, Period>(
            "SELECT * FROM periods WHERE company_id = ? ORDER BY year DESC, quarter DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(periods)
    }

    /// Persist a full period payload atomically.
    ///
    /// Any prior period for the same (company, quarter, year) is deleted
    /// first - children go with it via cascade - then the new period and
    /// all of its children are inserted. The whole replace is one
    /// transaction: on failure the prior state is preserved, and two
    /// workers racing on the same period cannot interleave.
    pub async fn save_period_atomic(
        &self,
        company_id: &str,
        payload: &PeriodPayload,
        pdf_hash: &str,
        source_file: &str,
    ) -> ExtractResult<String> {
        let period_id = Uuid::new_v4().to_string();
        let meta_json = serde_json::to_string(&payload.extraction_meta)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM periods WHERE company_id = ? AND quarter = ? AND year = ?")
            .bind(company_id)
            .bind(payload.quarter)
            .bind(payload.year)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"INSERT INTO periods
               (id, company_id, quarter, year, source_file, pdf_hash, currency, language, extraction_meta)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&period_id)
        .bind(company_id)
        .bind(payload.quarter)
        .bind(payload.year)
        .bind(source_file)
        .bind(pdf_hash)
        .bind(&payload.metadata.currency)
        .bind(payload.metadata.language.as_str())
        .bind(&meta_json)
        .execute(&mut *tx)
        .await?;

        for table in &payload.tables {
            sqlx::query(
                r#"INSERT INTO report_tables (period_id, table_id, title, table_type, page, columns, rows)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&period_id)
            .bind(&table.id)
            .bind(&table.title)
            .bind(table.kind.as_str())
            .bind(table.page)
            .bind(serde_json::to_string(&table.columns)?)
            .bind(serde_json::to_string(&table.rows)?)
            .execute(&mut *tx)
            .await?;
        }

        for section in &payload.sections {
            let embedding_json = section
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"INSERT INTO sections (period_id, section_id, title, section_type, page, content, embedding)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&period_id)
            .bind(&section.id)
            .bind(&section.title)
            .bind(&section.section_type)
            .bind(section.page)
            .bind(&section.content)
            .bind(embedding_json)
            .execute(&mut *tx)
            .await?;
        }

        for chart in &payload.charts {
            let data_points_json = chart
                .data_points
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"INSERT INTO charts (period_id, chart_id, title, chart_type, page, x_axis, y_axis, data_points)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&period_id)
            .bind(&chart.id)
            .bind(&chart.title)
            .bind(&chart.chart_type)
            .bind(chart.page)
            .bind(&chart.x_axis)
            .bind(&chart.y_axis)
            .bind(data_points_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            "Persisted period Q{} {} ({} tables, {} sections, {} charts)",
            payload.quarter,
            payload.year,
            payload.tables.len(),
            payload.sections.len(),
            payload.charts.len()
        );

        Ok(period_id)
    }

    /// Load a persisted period back into payload form (cache hits)
    pub async fn load_period(
        &self,
        company_id: &str,
        quarter: i64,
        year: i64,
    ) -> ExtractResult<Option<PeriodPayload>> {
        let Some(period) = sqlx::query_as::<_, Period>(
            "SELECT * FROM periods WHERE company_id = ? AND quarter = ? AND year = ?",
        )
        .bind(company_id)
        .bind(quarter)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tables = self.load_tables(&period.id).await?;
        let sections = self.load_sections(&period.id).await?;
        let charts = self.load_charts(&period.id).await?;

        let extraction_meta = period.meta().unwrap_or_default();
        let metadata = crate::models::ReportMetadata {
            language: period
                .language
                .as_deref()
                .map(crate::models::DocumentLanguage::parse)
                .unwrap_or_default(),
            currency: period.currency.clone(),
            number_format: extraction_meta.number_format,
            quarter: Some(period.quarter),
            year: Some(period.year),
        };

        Ok(Some(PeriodPayload {
            quarter: period.quarter,
            year: period.year,
            metadata,
            tables,
            sections,
            charts,
            extraction_meta,
        }))
    }

    async fn load_tables(&self, period_id: &str) -> ExtractResult<Vec<ReportTable>> {
        let rows: Vec<(String, String, String, Option<i64>, String, String)> = sqlx::query_as(
            "SELECT table_id, title, table_type, page, columns, rows FROM report_tables WHERE period_id = ? ORDER BY id",
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for (table_id, title, table_type, page, columns_json, rows_json) in rows {
            let columns: Vec<String> = serde_json::from_str(&columns_json)?;
            let table_rows: Vec<TableRow> = serde_json::from_str(&rows_json)?;
            tables.push(ReportTable {
                id: table_id,
                title,
                kind: TableKind::parse(&table_type),
                page,
                columns,
                rows: table_rows,
            });
        }
        Ok(tables)
    }

    async fn load_sections(&self, period_id: &str) -> ExtractResult<Vec<Section>> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<i64>, String, Option<String>)> =
            sqlx::query_as(
                "SELECT section_id, title, section_type, page, content, embedding FROM sections WHERE period_id = ? ORDER BY id",
            )
            .bind(period_id)
            .fetch_all(&self.pool)
            .await?;

        let mut sections = Vec::with_capacity(rows.len());
        for (section_id, title, section_type, page, content, embedding_json) in rows {
            let embedding = embedding_json
                .as_deref()
                .map(serde_json::from_str::<Vec<f32>>)
                .transpose()?;
            sections.push(Section {
                id: section_id,
                title,
                section_type,
                page,
                content,
                embedding,
            });
        }
        Ok(sections)
    }

    async fn load_charts(&self, period_id: &str) -> ExtractResult<Vec<Chart>> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<i64>, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(
                "SELECT chart_id, title, chart_type, page, x_axis, y_axis, data_points FROM charts WHERE period_id = ? ORDER BY id",
            )
            .bind(period_id)
            .fetch_all(&self.pool)
            .await?;

        let mut charts = Vec::with_capacity(rows.len());
        for (chart_id, title, chart_type, page, x_axis, y_axis, data_points_json) in rows {
            let data_points = data_points_json
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()?;
            charts.push(Chart {
                id: chart_id,
                title,
                chart_type,
                page,
                x_axis,
                y_axis,
                data_points,
            });
        }
        Ok(charts)
    }

    // ========================================================================
    // Counts and stats
    // ========================================================================

    /// Child counts for many periods at once: one query per child kind
    /// instead of three per period.
    pub async fn count_children_batch(
        &self,
        period_ids: &[String],
    ) -> ExtractResult<HashMap<String, ChildCounts>> {
        let mut result: HashMap<String, ChildCounts> = period_ids
            .iter()
            .map(|id| (id.clone(), ChildCounts::default()))
            .collect();
        if period_ids.is_empty() {
            return Ok(result);
        }

        let placeholders = vec!["?"; period_ids.len()].join(", ");

        for (table, pick) in [
            ("report_tables", 0usize),
            ("sections", 1),
            ("charts", 2),
        ] {
            let sql = format!(
                "SELECT period_id, COUNT(*) FROM {table} WHERE period_id IN ({placeholders}) GROUP BY period_id"
            );
            let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
            for id in period_ids {
                query = query.bind(id);
            }
            for (period_id, count) in query.fetch_all(&self.pool).await? {
                if let Some(counts) = result.get_mut(&period_id) {
                    match pick {
                        0 => counts.tables = count,
                        1 => counts.sections = count,
                        _ => counts.charts = count,
                    }
                }
            }
        }

        Ok(result)
    }

    /// Total child counts for a company, straight from the child tables
    pub async fn total_counts(&self, company_id: &str) -> ExtractResult<ChildCounts> {
        let count = |table: &str| {
            format!(
                "SELECT COUNT(*) FROM {table} t JOIN periods p ON p.id = t.period_id WHERE p.company_id = ?"
            )
        };

        let (tables,): (i64,) = sqlx::query_as(&count("report_tables"))
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;
        let (sections,): (i64,) = sqlx::query_as(&count("sections"))
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;
        let (charts,): (i64,) = sqlx::query_as(&count("charts"))
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(ChildCounts {
            tables,
            sections,
            charts,
        })
    }

    pub async fn embedding_stats(&self, company_id: &str) -> ExtractResult<EmbeddingStats> {
        let (total_sections,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sections s JOIN periods p ON p.id = s.period_id WHERE p.company_id = ?",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        let (with_embedding,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sections s JOIN periods p ON p.id = s.period_id WHERE p.company_id = ? AND s.embedding IS NOT NULL",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(EmbeddingStats {
            total_sections,
            with_embedding,
        })
    }

    // ========================================================================
    // Embeddings
    // ========================================================================

    /// Sections of a company still lacking a vector
    pub async fn sections_without_embedding(
        &self,
        company_id: &str,
    ) -> ExtractResult<Vec<SectionForEmbedding>> {
        let rows: Vec<(i64, Option<String>, String)> = sqlx::query_as(
            r#"SELECT s.id, s.title, s.content
               FROM sections s JOIN periods p ON p.id = s.period_id
               WHERE p.company_id = ? AND s.embedding IS NULL
               ORDER BY s.id"#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(row_id, title, content)| SectionForEmbedding {
                row_id,
                title,
                content,
            })
            .collect())
    }

    pub async fn set_section_embedding(
        &self,
        section_row_id: i64,
        embedding: &[f32],
    ) -> ExtractResult<()> {
        let json = serde_json::to_string(embedding)?;
        sqlx::query("UPDATE sections SET embedding = ? WHERE id = ?")
            .bind(json)
            .bind(section_row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // File/store sync support
    // ========================================================================

    /// Every pdf_hash persisted for a company; drives pending/persisted sync
    pub async fn company_pdf_hashes(&self, company_id: &str) -> ExtractResult<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT pdf_hash FROM periods WHERE company_id = ?")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(h,)| h).collect())
    }
}
