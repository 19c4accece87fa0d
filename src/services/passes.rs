//! Pass Runner - executes one extraction pass against the LLM.
//!
//! Three passes share the same adapter but differ in model tier, prompt
//! and output budget:
//!
//! ```text
//! Pass 1  structure map   low-cost  ~16k output tokens
//! Pass 2  tables/charts   premium   ~60k output tokens
//! Pass 3  narrative       low-cost  ~32k output tokens
//! repair  broken tables   low-cost  ~32k output tokens
//! ```
//!
//! Passes 2 and 3 run concurrently, each taking its own permit from the
//! shared semaphore so the global LLM concurrency cap holds across PDFs.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::info;

use crate::config::LlmConfig;
use crate::models::{NarrativeOutput, NumberFormat, PassStats, StructureOutput, TablesOutput};
use crate::services::llm::prompts::{self, RepairTarget};
use crate::services::llm::{cost_sek, salvage_json, LlmClient, ModelTier};
use crate::utils::{ExtractError, ExtractResult};

/// Result of one pass, parametrized over the decoded payload
#[derive(Debug, Clone)]
pub struct PassOutcome<T> {
    pub pass_number: u8,
    pub tier: ModelTier,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub data: T,
}

impl<T> PassOutcome<T> {
    pub fn cost_sek(&self) -> f64 {
        cost_sek(self.tier, self.input_tokens, self.output_tokens)
    }

    pub fn stats(&self) -> PassStats {
        PassStats {
            pass: self.pass_number,
            model: self.model.clone(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            elapsed_seconds: self.elapsed_seconds,
            cost_sek: self.cost_sek(),
        }
    }

    /// A pass that had nothing to do: zero tokens, zero cost
    fn empty(pass_number: u8, tier: ModelTier, model: &str, data: T) -> Self {
        Self {
            pass_number,
            tier,
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            elapsed_seconds: 0.0,
            data,
        }
    }
}

#[derive(Clone)]
pub struct PassRunner {
    llm: Arc<LlmClient>,
    semaphore: Arc<Semaphore>,
    config: LlmConfig,
}

impl PassRunner {
    pub fn new(llm: Arc<LlmClient>, semaphore: Arc<Semaphore>, config: LlmConfig) -> Self {
        Self {
            llm,
            semaphore,
            config,
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::LowCost => &self.config.low_cost_model,
            ModelTier::Premium => &self.config.premium_model,
        }
    }

    /// One semaphore-guarded streamed call, salvaged and decoded
    async fn run_pass<T>(
        &self,
        pass_number: u8,
        tier: ModelTier,
        max_tokens: u32,
        pdf_base64: &str,
        prompt: &str,
    ) -> ExtractResult<PassOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let model = self.model_for(tier).to_string();
        let start = Instant::now();

        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExtractError::Canceled)?;

        let response = self
            .llm
            .stream_document(&model, max_tokens, pdf_base64, prompt)
            .await?;

        let value = salvage_json(&response.full_text)?;
        let data: T = serde_json::from_value(value)
            .map_err(|e| ExtractError::Malformed(format!("pass {pass_number} schema: {e}")))?;

        let elapsed = start.elapsed().as_secs_f64();
        let outcome = PassOutcome {
            pass_number,
            tier,
            model,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            elapsed_seconds: elapsed,
            data,
        };

        info!(
            "Pass {} ({}): {:.1}s | {}+{} tokens | {:.2} SEK",
            pass_number,
            outcome.model,
            elapsed,
            outcome.input_tokens,
            outcome.output_tokens,
            outcome.cost_sek()
        );

        Ok(outcome)
    }

    /// Pass 1: map the document structure
    pub async fn run_structure(&self, pdf_base64: &str) -> ExtractResult<PassOutcome<StructureOutput>> {
        self.run_pass(
            1,
            ModelTier::LowCost,
            self.config.structure_max_tokens,
            pdf_base64,
            prompts::STRUCTURE_PROMPT,
        )
        .await
    }

    /// Pass 2: materialize every table and chart from the structure map
    pub async fn run_tables(
        &self,
        pdf_base64: &str,
        structure: &StructureOutput,
    ) -> ExtractResult<PassOutcome<TablesOutput>> {
        let element_ids: Vec<String> = structure
            .structure_map
            .tables
            .iter()
            .chain(structure.structure_map.charts.iter())
            .map(|e| e.id.clone())
            .collect();

        if element_ids.is_empty() {
            let model = self.model_for(ModelTier::Premium);
            return Ok(PassOutcome::empty(
                2,
                ModelTier::Premium,
                model,
                TablesOutput::default(),
            ));
        }

        let prompt = prompts::tables_prompt(structure, &element_ids);
        self.run_pass(
            2,
            ModelTier::Premium,
            self.config.tables_max_tokens,
            pdf_base64,
            &prompt,
        )
        .await
    }

    /// Pass 3: extract narrative sections
    pub async fn run_narrative(
        &self,
        pdf_base64: &str,
        structure: &StructureOutput,
    ) -> ExtractResult<PassOutcome<NarrativeOutput>> {
        let section_ids: Vec<String> = structure
            .structure_map
            .sections
            .iter()
            .map(|e| e.id.clone())
            .collect();

        if section_ids.is_empty() {
            let model = self.model_for(ModelTier::LowCost);
            return Ok(PassOutcome::empty(
                3,
                ModelTier::LowCost,
                model,
                NarrativeOutput::default(),
            ));
        }

        let prompt = prompts::narrative_prompt(structure, &section_ids);
        self.run_pass(
            3,
            ModelTier::LowCost,
            self.config.narrative_max_tokens,
            pdf_base64,
            &prompt,
        )
        .await
    }

    /// Targeted repair call for missing or broken tables
    pub async fn run_repair(
        &self,
        pdf_base64: &str,
        targets: &[RepairTarget],
        number_format: NumberFormat,
    ) -> ExtractResult<PassOutcome<TablesOutput>> {
        let prompt = prompts::repair_prompt(targets, number_format);
        self.run_pass(
            4,
            ModelTier::LowCost,
            self.config.repair_max_tokens,
            pdf_base64,
            &prompt,
        )
        .await
    }
}
