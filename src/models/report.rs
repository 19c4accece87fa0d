//! Extracted report content: tables, sections, charts and the pass 1
//! structure map they are materialized from.
//!
//! These types double as the wire format for LLM responses, so serde
//! attributes are lenient where model output is known to wobble.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Document metadata (pass 1)
// ============================================================================

/// Report language as detected in pass 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentLanguage {
    #[default]
    Sv,
    No,
    En,
}

impl DocumentLanguage {
    pub fn parse(s: &str) -> Self {
        match s {
            "no" => Self::No,
            "en" => Self::En,
            _ => Self::Sv,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sv => "sv",
            Self::No => "no",
            Self::En => "en",
        }
    }
}

/// Number formatting convention used in the source document.
///
/// Swedish reports write `1 234,5`; English reports write `1,234.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NumberFormat {
    #[default]
    Swedish,
    English,
}

impl NumberFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swedish => "swedish",
            Self::English => "english",
        }
    }

    /// One-line description used in extraction prompts
    pub fn prompt_hint(&self) -> &'static str {
        match self {
            Self::Swedish => "comma = decimal separator, space = thousands separator",
            Self::English => "dot = decimal separator, comma = thousands separator",
        }
    }
}

/// Document-level metadata reported by pass 1
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportMetadata {
    #[serde(default)]
    pub language: DocumentLanguage,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub number_format: NumberFormat,
    /// Quarter/year as read from the report itself. Fallback when the
    /// filename carries no period marker.
    #[serde(default)]
    pub quarter: Option<i64>,
    #[serde(default)]
    pub year: Option<i64>,
}

// ============================================================================
// Structure map (pass 1 output)
// ============================================================================

/// One element enumerated by pass 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    /// Column headers, present for table entries only
    #[serde(default)]
    pub column_headers: Option<Vec<String>>,
}

/// Map of every extractable element in the document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructureMap {
    #[serde(default)]
    pub tables: Vec<StructureEntry>,
    #[serde(default)]
    pub sections: Vec<StructureEntry>,
    #[serde(default)]
    pub charts: Vec<StructureEntry>,
}

/// Complete pass 1 response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructureOutput {
    #[serde(default)]
    pub metadata: ReportMetadata,
    #[serde(default)]
    pub structure_map: StructureMap,
}

// ============================================================================
// Tables
// ============================================================================

/// Financial table classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Kpi,
    #[default]
    #[serde(other)]
    Other,
}

impl TableKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "income_statement" => Self::IncomeStatement,
            "balance_sheet" => Self::BalanceSheet,
            "cash_flow" => Self::CashFlow,
            "kpi" => Self::Kpi,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::Kpi => "kpi",
            Self::Other => "other",
        }
    }
}

/// One table row. `values[0]` is null for the label column except when the
/// label itself is a year (forward-contract style tables).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<i64>,
}

/// One extracted financial table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTable {
    /// Stable id within the period, e.g. `table_3`
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: TableKind,
    #[serde(default)]
    pub page: Option<i64>,
    /// Ordered column headers; first header is the empty label column
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

impl ReportTable {
    /// Renumber rows densely from 1, preserving current order
    pub fn normalize_row_order(&mut self) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.order = Some(i as i64 + 1);
        }
    }
}

// ============================================================================
// Sections and charts
// ============================================================================

/// One narrative text block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub section_type: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub content: String,
    /// 1024-dim vector, filled in by the embedding worker after persist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Descriptor of a graphic. Only structural presence is validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chart {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub data_points: Option<Value>,
}

/// Pass 2 response: materialized tables and charts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TablesOutput {
    #[serde(default)]
    pub tables: Vec<ReportTable>,
    #[serde(default)]
    pub charts: Vec<Chart>,
}

/// Pass 3 response: narrative sections
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NarrativeOutput {
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_kind_tolerates_unknown_values() {
        let t: TableKind = serde_json::from_str("\"income_statement\"").unwrap();
        assert_eq!(t, TableKind::IncomeStatement);
        let t: TableKind = serde_json::from_str("\"segment_overview\"").unwrap();
        assert_eq!(t, TableKind::Other);
    }

    #[test]
    fn normalize_row_order_is_dense_from_one() {
        let mut table: ReportTable = serde_json::from_value(serde_json::json!({
            "id": "table_1",
            "title": "Nyckeltal",
            "type": "kpi",
            "columns": ["", "Q3 2024"],
            "rows": [
                {"label": "Omsättning", "values": [null, 134]},
                {"label": "EBIT", "values": [null, 17], "order": 9}
            ]
        }))
        .unwrap();

        table.normalize_row_order();
        let orders: Vec<i64> = table.rows.iter().filter_map(|r| r.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn structure_output_parses_partial_metadata() {
        let out: StructureOutput = serde_json::from_value(serde_json::json!({
            "metadata": {"language": "en", "currency": "SEK"},
            "structure_map": {"tables": [{"id": "table_1", "title": "Income statement", "page": 4}]}
        }))
        .unwrap();

        assert_eq!(out.metadata.language, DocumentLanguage::En);
        assert_eq!(out.metadata.number_format, NumberFormat::Swedish);
        assert_eq!(out.structure_map.tables.len(), 1);
        assert!(out.structure_map.sections.is_empty());
    }
}
