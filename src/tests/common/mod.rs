// Common test utilities and helpers

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::{
    ExtractionMeta, Pass1Counts, PeriodPayload, ReportMetadata, Section, TableKind,
};

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// A payload shaped like a small real extraction: two tables, two
/// sections, one chart
pub fn sample_payload(quarter: i64, year: i64) -> PeriodPayload {
    let tables = serde_json::from_value(serde_json::json!([
        {
            "id": "table_1",
            "title": "Koncernens resultaträkning",
            "type": "income_statement",
            "page": 4,
            "columns": ["", "Q3 2024", "Q3 2023"],
            "rows": [
                {"label": "Nettoomsättning", "values": [null, 134.2, 139.0], "order": 1},
                {"label": "Rörelseresultat", "values": [null, 17.1, 21.4], "order": 2}
            ]
        },
        {
            "id": "table_2",
            "title": "Nyckeltal",
            "type": "kpi",
            "page": 5,
            "columns": ["", "Q3 2024"],
            "rows": [
                {"label": "Soliditet", "values": [null, 55.0], "order": 1}
            ]
        }
    ]))
    .expect("sample tables");

    let sections: Vec<Section> = serde_json::from_value(serde_json::json!([
        {"id": "section_1", "title": "VD har ordet", "type": "ceo_letter", "page": 2,
         "content": "Ett starkt kvartal med god tillväxt."},
        {"id": "section_2", "title": "Utsikter", "type": "outlook", "page": 11,
         "content": "Efterfrågan väntas vara fortsatt stabil."}
    ]))
    .expect("sample sections");

    let charts = serde_json::from_value(serde_json::json!([
        {"id": "chart_1", "title": "Omsättning per kvartal", "type": "bar", "page": 3,
         "x_axis": "Kvartal", "y_axis": "MSEK",
         "data_points": [{"label": "Q3 2024", "value": 134.2}]}
    ]))
    .expect("sample charts");

    PeriodPayload {
        quarter,
        year,
        metadata: ReportMetadata {
            currency: Some("SEK".to_string()),
            quarter: Some(quarter),
            year: Some(year),
            ..Default::default()
        },
        tables,
        sections,
        charts,
        extraction_meta: ExtractionMeta {
            total_cost_sek: 4.20,
            total_elapsed_seconds: 88.5,
            pass1_counts: Pass1Counts {
                tables: 2,
                sections: 2,
                charts: 1,
            },
            ..Default::default()
        },
    }
}

/// The sample tables all carry TableKind values that must survive a
/// store round trip
pub fn sample_table_kinds() -> Vec<TableKind> {
    vec![TableKind::IncomeStatement, TableKind::Kpi]
}
