//! Repair Loop - one targeted low-cost call for missing or broken tables.
//!
//! Runs exactly once per period to bound cost. Tables returned by the
//! repair call replace prior versions with the same id; residual errors
//! after re-validation are recorded but do not block persistence.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::models::{MissingTable, NumberFormat, RepairStats, ReportTable, StructureOutput};
use crate::services::llm::prompts::RepairTarget;
use crate::services::passes::PassRunner;
use crate::services::validation::{validate_tables, ValidationOutcome};

/// Final table set plus everything the metadata blob needs to record
#[derive(Debug)]
pub struct RepairOutcome {
    pub tables: Vec<ReportTable>,
    pub validation: ValidationOutcome,
    pub stats: RepairStats,
    /// Tables pass 1 found that are still absent after repair
    pub missing_after: Vec<MissingTable>,
}

/// Ids present in the structure map but absent from the extracted tables
fn missing_table_ids(structure: &StructureOutput, tables: &[ReportTable]) -> BTreeSet<String> {
    let extracted: BTreeSet<&str> = tables.iter().map(|t| t.id.as_str()).collect();
    structure
        .structure_map
        .tables
        .iter()
        .filter(|e| !extracted.contains(e.id.as_str()))
        .map(|e| e.id.clone())
        .collect()
}

fn missing_tables(structure: &StructureOutput, tables: &[ReportTable]) -> Vec<MissingTable> {
    missing_table_ids(structure, tables)
        .into_iter()
        .filter_map(|id| {
            structure
                .structure_map
                .tables
                .iter()
                .find(|e| e.id == id)
                .map(|e| MissingTable {
                    table_id: e.id.clone(),
                    table_title: e.title.clone().unwrap_or_else(|| "Okänd".to_string()),
                    page: e.page,
                })
        })
        .collect()
}

/// Validate the pass 2 tables and run at most one repair call.
///
/// With nothing missing and nothing broken this exits without touching
/// the LLM and the returned stats are all zero.
pub async fn validate_and_repair(
    runner: &PassRunner,
    pdf_base64: &str,
    structure: &StructureOutput,
    mut tables: Vec<ReportTable>,
    number_format: NumberFormat,
) -> RepairOutcome {
    let validation = validate_tables(&tables);
    let broken = validation.tables_with_errors();
    let missing = missing_table_ids(structure, &tables);

    if missing.is_empty() && broken.is_empty() {
        return RepairOutcome {
            missing_after: Vec::new(),
            tables,
            validation,
            stats: RepairStats::default(),
        };
    }

    if !missing.is_empty() {
        info!("{} table(s) missing after pass 2: {:?}", missing.len(), missing);
    }
    if !broken.is_empty() {
        info!("{} table(s) with validation errors: {:?}", broken.len(), broken);
    }

    // One prompt covering every problem table
    let mut targets = Vec::new();
    for mt in missing_tables(structure, &tables) {
        let columns = structure
            .structure_map
            .tables
            .iter()
            .find(|e| e.id == mt.table_id)
            .and_then(|e| e.column_headers.clone())
            .unwrap_or_default();
        targets.push(RepairTarget::missing(&mt, columns));
    }
    for table_id in &broken {
        if let Some(table) = tables.iter().find(|t| &t.id == table_id) {
            let errors = validation.errors_for(table_id);
            targets.push(RepairTarget::broken(
                &table.id,
                &table.title,
                table.page,
                &errors,
                table.columns.clone(),
            ));
        }
    }

    let target_count = targets.len() as u32;

    match runner.run_repair(pdf_base64, &targets, number_format).await {
        Ok(outcome) => {
            let stats = RepairStats {
                repair_count: 1,
                tables_repaired: outcome.data.tables.len() as u32,
                input_tokens: outcome.input_tokens,
                output_tokens: outcome.output_tokens,
                elapsed_seconds: outcome.elapsed_seconds,
                cost_sek: outcome.cost_sek(),
            };

            let repaired = outcome.data.tables;
            let repaired_ids: BTreeSet<String> =
                repaired.iter().map(|t| t.id.clone()).collect();

            // repaired tables replace prior versions of the same id
            tables.retain(|t| !repaired_ids.contains(&t.id));
            tables.extend(repaired);

            let final_validation = validate_tables(&tables);
            info!(
                "Repair done: {}/{} table(s) returned, {} error(s) remain",
                repaired_ids.len(),
                target_count,
                final_validation.errors.len()
            );

            RepairOutcome {
                missing_after: missing_tables(structure, &tables),
                validation: final_validation,
                tables,
                stats,
            }
        }
        Err(e) => {
            // a failed repair keeps the pass 2 tables; the period persists
            // with its validation errors recorded
            warn!("Repair call failed, keeping pass 2 tables: {}", e);
            RepairOutcome {
                missing_after: missing_tables(structure, &tables),
                validation,
                tables,
                stats: RepairStats {
                    repair_count: 1,
                    ..Default::default()
                },
            }
        }
    }
}
