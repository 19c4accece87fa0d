//! Wire types and cost model for the Anthropic Messages API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Model tiers and pricing
// ============================================================================

/// USD per million tokens
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

/// The two model classes the pipeline uses. Structure, narrative and repair
/// run on the low-cost tier; table extraction runs on the premium tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    LowCost,
    Premium,
}

impl ModelTier {
    pub fn pricing(&self) -> ModelPricing {
        match self {
            Self::LowCost => ModelPricing {
                input_usd_per_mtok: 0.80,
                output_usd_per_mtok: 4.00,
            },
            Self::Premium => ModelPricing {
                input_usd_per_mtok: 3.00,
                output_usd_per_mtok: 15.00,
            },
        }
    }
}

/// Fixed USD→SEK multiplier carried with every cost figure
pub const USD_TO_SEK: f64 = 10.50;

/// Cost of one call in SEK
pub fn cost_sek(tier: ModelTier, input_tokens: u64, output_tokens: u64) -> f64 {
    let p = tier.pricing();
    let usd = (input_tokens as f64 * p.input_usd_per_mtok
        + output_tokens as f64 * p.output_usd_per_mtok)
        / 1_000_000.0;
    usd * USD_TO_SEK
}

// ============================================================================
// Request body
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub stream: bool,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock<'a> {
    Document { source: DocumentSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
pub struct DocumentSource<'a> {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: &'static str,
    pub data: &'a str,
}

impl<'a> DocumentSource<'a> {
    pub fn pdf(base64_data: &'a str) -> Self {
        Self {
            source_type: "base64",
            media_type: "application/pdf",
            data: base64_data,
        }
    }
}

// ============================================================================
// Streaming response events
// ============================================================================

/// One decoded SSE event. Fields are optional because event shapes differ
/// per `type`; the client only reads what it needs.
#[derive(Debug, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub message: Option<StreamMessage>,
    #[serde(default)]
    pub delta: Option<StreamDelta>,
    #[serde(default)]
    pub usage: Option<StreamUsage>,
    #[serde(default)]
    pub error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub message: String,
}

/// Aggregated result of one streamed call
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub full_text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
