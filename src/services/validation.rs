//! Pure validation of extracted tables and sections.
//!
//! Table errors feed the repair loop; section findings are always warnings
//! and never trigger another LLM call.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{ReportTable, Section, ValidationIssue};
use crate::utils::StringExt;

/// Placeholder labels the model invents when it cannot read a row name
static INVALID_LABEL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^label:\s*\d+$").unwrap(),
        Regex::new(r"(?i)^row\s*\d+$").unwrap(),
        Regex::new(r"(?i)^rad\s*\d+$").unwrap(),
        // bare numbers that are not years (years are exempted before matching)
        Regex::new(r"^\d+$").unwrap(),
        Regex::new(r"^\s*$").unwrap(),
    ]
});

/// Years are legitimate row labels (forward contract overviews and the like)
static VALID_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(19|20)\d{2}$").unwrap());

/// Aggregate validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Table ids needing repair
    pub fn tables_with_errors(&self) -> BTreeSet<String> {
        self.errors.iter().map(|e| e.table_id.clone()).collect()
    }

    /// Findings for one table id, used to build the repair prompt
    pub fn errors_for(&self, table_id: &str) -> Vec<&ValidationIssue> {
        self.errors
            .iter()
            .filter(|e| e.table_id == table_id)
            .collect()
    }
}

/// True when the label is a four-digit year in 1900-2099
pub fn is_valid_year(label: &str) -> bool {
    VALID_YEAR.is_match(label.trim())
}

/// True for generic placeholders and whitespace-only labels
pub fn is_invalid_label(label: &str) -> bool {
    if label.is_empty() {
        return true;
    }
    if is_valid_year(label) {
        return false;
    }
    let trimmed = label.trim();
    INVALID_LABEL_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

fn is_year_value(value: &Value) -> bool {
    let year = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    matches!(year, Some(y) if (1900..=2099).contains(&y))
}

/// Validate one table, appending findings to the outcome
fn validate_table(table: &ReportTable, outcome: &mut ValidationOutcome) {
    let issue = |error_type: &str, message: String, row_index: Option<usize>| ValidationIssue {
        table_id: table.id.clone(),
        table_title: table.title.clone(),
        error_type: error_type.to_string(),
        message,
        row_index,
    };

    if table.rows.is_empty() {
        outcome
            .errors
            .push(issue("empty_table", "table has no rows".to_string(), None));
        return;
    }

    let num_columns = table.columns.len();

    for (i, row) in table.rows.iter().enumerate() {
        if is_invalid_label(&row.label) {
            outcome.errors.push(issue(
                "invalid_label",
                format!(
                    "invalid label '{}' - must be the actual row text from the PDF",
                    row.label
                ),
                Some(i),
            ));
        }

        if num_columns > 0 && row.values.len() != num_columns {
            outcome.errors.push(issue(
                "values_length_mismatch",
                format!(
                    "row '{}' has {} values but the table has {} columns",
                    row.label,
                    row.values.len(),
                    num_columns
                ),
                Some(i),
            ));
        }

        // label column should be null; a leading year is fine
        if let Some(first) = row.values.first() {
            if !first.is_null() && !is_year_value(first) {
                outcome.warnings.push(issue(
                    "first_value_not_null",
                    format!("row '{}' has first value {} instead of null", row.label, first),
                    Some(i),
                ));
            }
        }
    }
}

/// Validate all tables of a period
pub fn validate_tables(tables: &[ReportTable]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    for table in tables {
        validate_table(table, &mut outcome);
    }
    outcome
}

/// Validate sections. Only produces warnings.
pub fn validate_sections(sections: &[Section]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for section in sections {
        let issue = |error_type: &str, message: String| ValidationIssue {
            table_id: section.id.clone(),
            table_title: section.title.clone().unwrap_or_default(),
            error_type: error_type.to_string(),
            message,
            row_index: None,
        };

        if section.content.trim().is_empty() {
            outcome
                .warnings
                .push(issue("empty_content", "section has no content".to_string()));
        }
        if section.title.as_deref().and_then(|t| t.clean()).is_none() {
            outcome.warnings.push(issue(
                "missing_title",
                format!("section '{}' has no title", section.id),
            ));
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(rows: Value) -> ReportTable {
        serde_json::from_value(json!({
            "id": "table_1",
            "title": "Resultaträkning",
            "type": "income_statement",
            "page": 4,
            "columns": ["", "Q3 2024", "Q3 2023"],
            "rows": rows
        }))
        .unwrap()
    }

    #[test]
    fn accepts_well_formed_table() {
        let t = table(json!([
            {"label": "Nettoomsättning", "values": [null, 134.2, 139.0], "order": 1},
            {"label": "Rörelseresultat", "values": [null, 17.1, 21.4], "order": 2}
        ]));
        let outcome = validate_tables(&[t]);
        assert!(outcome.is_valid());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn flags_empty_table() {
        let outcome = validate_tables(&[table(json!([]))]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].error_type, "empty_table");
    }

    #[test]
    fn flags_generic_labels() {
        let t = table(json!([
            {"label": "1", "values": [null, 134, 139]},
            {"label": "row 2", "values": [null, 1, 2]},
            {"label": "rad 3", "values": [null, 1, 2]},
            {"label": "label: 4", "values": [null, 1, 2]},
            {"label": "   ", "values": [null, 1, 2]}
        ]));
        let outcome = validate_tables(&[t]);
        let invalid: Vec<_> = outcome
            .errors
            .iter()
            .filter(|e| e.error_type == "invalid_label")
            .collect();
        // "1" is numeric but not a year, so it counts as invalid too
        assert_eq!(invalid.len(), 5);
        assert_eq!(invalid[0].row_index, Some(0));
    }

    #[test]
    fn year_labels_are_valid() {
        let t = table(json!([
            {"label": "2025", "values": [2025, 410.0, null]},
            {"label": "2026", "values": [2026, 120.0, null]}
        ]));
        let outcome = validate_tables(&[t]);
        assert!(outcome.is_valid());
        // leading year values raise no warning either
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn flags_values_length_mismatch() {
        let t = table(json!([
            {"label": "Kassaflöde", "values": [null, 12.0]}
        ]));
        let outcome = validate_tables(&[t]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].error_type, "values_length_mismatch");
        assert_eq!(outcome.tables_with_errors().len(), 1);
    }

    #[test]
    fn warns_on_non_null_first_value() {
        let t = table(json!([
            {"label": "Soliditet", "values": [55.0, 54.0, 53.0]}
        ]));
        let outcome = validate_tables(&[t]);
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].error_type, "first_value_not_null");
    }

    #[test]
    fn section_findings_are_warnings_only() {
        let sections: Vec<Section> = serde_json::from_value(json!([
            {"id": "section_1", "title": "VD har ordet", "content": "Ett starkt kvartal."},
            {"id": "section_2", "content": "Utsikter."},
            {"id": "section_3", "title": "Risker", "content": "  "}
        ]))
        .unwrap();

        let outcome = validate_sections(&sections);
        assert!(outcome.errors.is_empty());
        let kinds: Vec<_> = outcome.warnings.iter().map(|w| w.error_type.as_str()).collect();
        assert_eq!(kinds, vec!["missing_title", "empty_content"]);
    }
}
