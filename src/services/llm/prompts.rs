//! Prompt templates for the three extraction passes and the repair call.
//!
//! Every prompt demands raw JSON (no prose, no fences) because the response
//! goes straight into the salvager. The table rules mirror what the
//! validator enforces, so the model is told up front what will be rejected.

use crate::models::{MissingTable, NumberFormat, StructureOutput, ValidationIssue};

/// Pass 1: enumerate every table, section and chart plus document metadata
pub const STRUCTURE_PROMPT: &str = r#"You are analyzing a Nordic corporate quarterly report (PDF attached).

Identify EVERY financial table, narrative section and chart in the document. Do not extract their contents yet, only map the structure.

Return ONLY a JSON object, no prose and no markdown fences:

{
  "metadata": {
    "language": "sv|no|en",
    "currency": "SEK|NOK|EUR|USD|...",
    "number_format": "swedish|english",
    "quarter": 1,
    "year": 2024
  },
  "structure_map": {
    "tables": [
      {"id": "table_1", "title": "Koncernens resultaträkning", "type": "income_statement|balance_sheet|cash_flow|kpi|other", "page": 4, "column_headers": ["", "Q3 2024", "Q3 2023"]}
    ],
    "sections": [
      {"id": "section_1", "title": "VD har ordet", "type": "ceo_letter|outlook|segment|risk|other", "page": 2}
    ],
    "charts": [
      {"id": "chart_1", "title": "Omsättning per kvartal", "type": "bar|line|pie|other", "page": 3}
    ]
  }
}

Rules:
- Number ids sequentially in reading order: table_1, table_2, ... section_1, ...
- "number_format" is "swedish" when the document writes 1 234,5 and "english" when it writes 1,234.5.
- Include every table, even small KPI boxes. Include the first empty header for the label column.
- quarter and year refer to the reporting period of the document."#;

/// Pass 2: materialize all tables and charts listed in the structure map
pub fn tables_prompt(structure: &StructureOutput, element_ids: &[String]) -> String {
    let structure_json =
        serde_json::to_string_pretty(structure).unwrap_or_else(|_| "{}".to_string());
    let number_format = structure.metadata.number_format;

    format!(
        r#"You are extracting financial tables from the attached quarterly report.

A structure analysis of this document already exists:

{structure_json}

Extract the complete contents of these elements: {ids}

Return ONLY a JSON object:

{{
  "tables": [
    {{
      "id": "table_X",
      "title": "table title",
      "type": "income_statement|balance_sheet|cash_flow|kpi|other",
      "page": N,
      "columns": ["", "Column 1", "Column 2"],
      "rows": [
        {{"label": "Actual row label from the PDF", "values": [null, 123.4, 456.7], "order": 1, "indent": 0}}
      ]
    }}
  ],
  "charts": [
    {{"id": "chart_X", "title": "...", "type": "bar", "page": N, "x_axis": "...", "y_axis": "...", "data_points": [{{"label": "Q1", "value": 12.3}}]}}
  ]
}}

Critical rules:
1. Echo the columns from the structure map; the first column header is always "".
2. Every row label must be the ACTUAL text printed in the PDF. Never "1", "row 1" or "label: 1".
3. values[0] is ALWAYS null (the label column), unless the row label itself is a year.
4. The number of values must equal the number of columns, for every row.
5. Number the rows with "order" starting at 1. Use "indent": 1 or 2 for indented rows.
6. Numbers in this document: {format_hint}. Convert to plain JSON numbers.
7. Document language: {language}."#,
        structure_json = structure_json,
        ids = element_ids.join(", "),
        format_hint = number_format.prompt_hint(),
        language = structure.metadata.language.as_str(),
    )
}

/// Pass 3: extract narrative text for all sections in the structure map
pub fn narrative_prompt(structure: &StructureOutput, section_ids: &[String]) -> String {
    let structure_json =
        serde_json::to_string_pretty(structure).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are extracting narrative text from the attached quarterly report.

A structure analysis of this document already exists:

{structure_json}

Extract the full text of these sections: {ids}

Return ONLY a JSON object:

{{
  "sections": [
    {{"id": "section_X", "title": "section title", "type": "ceo_letter", "page": N, "content": "verbatim section text"}}
  ]
}}

Rules:
1. Content must be the verbatim text from the PDF. Light normalization of line breaks and hyphenation is allowed; summarizing is not.
2. Keep the document language ({language}); never translate.
3. Include every section id listed above."#,
        structure_json = structure_json,
        ids = section_ids.join(", "),
        language = structure.metadata.language.as_str(),
    )
}

/// Description of one table the repair call must re-extract
#[derive(Debug, serde::Serialize)]
pub struct RepairTarget {
    pub id: String,
    pub title: String,
    pub page: Option<i64>,
    pub issue: String,
    pub columns: Vec<String>,
}

impl RepairTarget {
    pub fn missing(mt: &MissingTable, columns: Vec<String>) -> Self {
        Self {
            id: mt.table_id.clone(),
            title: mt.table_title.clone(),
            page: mt.page,
            issue: "MISSING - extract from the PDF".to_string(),
            columns,
        }
    }

    pub fn broken(
        id: &str,
        title: &str,
        page: Option<i64>,
        errors: &[&ValidationIssue],
        columns: Vec<String>,
    ) -> Self {
        let joined = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            id: id.to_string(),
            title: title.to_string(),
            page,
            issue: format!("INVALID: {joined}"),
            columns,
        }
    }
}

/// Single targeted repair prompt covering every missing or broken table
pub fn repair_prompt(targets: &[RepairTarget], number_format: NumberFormat) -> String {
    let targets_json = serde_json::to_string_pretty(targets).unwrap_or_else(|_| "[]".to_string());
    let all_ids = targets
        .iter()
        .map(|t| t.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"EXTRACT/CORRECT TABLES

The following tables from the attached report need to be extracted or corrected:

{targets_json}

Return ONLY a JSON object:

{{
  "tables": [
    {{
      "id": "table_X",
      "title": "table title",
      "type": "income_statement|balance_sheet|cash_flow|kpi|other",
      "page": N,
      "columns": ["", "Column 1", "Column 2"],
      "rows": [
        {{"label": "Actual row label from the PDF", "values": [null, 123, 456], "order": 1}}
      ]
    }}
  ]
}}

Critical rules:
1. Extract EVERY table listed ({all_ids}).
2. Read the ACTUAL row labels from the PDF - never generic labels like "1" or "row 1".
3. values[0] is ALWAYS null (the label column), unless the row label itself is a year.
4. The number of values must equal the number of columns.
5. Numbers in this document: {format_hint}."#,
        targets_json = targets_json,
        all_ids = all_ids,
        format_hint = number_format.prompt_hint(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StructureEntry;

    fn structure_with_one_table() -> StructureOutput {
        StructureOutput {
            structure_map: crate::models::StructureMap {
                tables: vec![StructureEntry {
                    id: "table_1".into(),
                    title: Some("Nyckeltal".into()),
                    entry_type: Some("kpi".into()),
                    page: Some(3),
                    column_headers: Some(vec!["".into(), "Q1 2025".into()]),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn tables_prompt_lists_requested_ids() {
        let prompt = tables_prompt(&structure_with_one_table(), &["table_1".to_string()]);
        assert!(prompt.contains("table_1"));
        assert!(prompt.contains("comma = decimal separator"));
    }

    #[test]
    fn repair_prompt_includes_issue_descriptions() {
        let mt = MissingTable {
            table_id: "table_4".into(),
            table_title: "Kassaflöde".into(),
            page: Some(9),
        };
        let targets = vec![RepairTarget::missing(&mt, vec!["".into(), "Q3".into()])];
        let prompt = repair_prompt(&targets, NumberFormat::Swedish);
        assert!(prompt.contains("table_4"));
        assert!(prompt.contains("MISSING"));
    }
}
