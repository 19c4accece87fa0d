//! LLM adapter: Messages API client, JSON salvage and prompt assembly.
//!
//! The client is deliberately thin - model selection, retries and cost
//! bookkeeping live in the pass runner and the pipeline.

mod client;
mod models;
pub mod prompts;
mod salvage;

pub use client::LlmClient;
pub use models::{cost_sek, LlmResponse, ModelPricing, ModelTier, USD_TO_SEK};
pub use salvage::salvage_json;
