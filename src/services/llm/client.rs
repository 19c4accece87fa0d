//! LLM Client - HTTP client for the Anthropic Messages API.
//!
//! Thin adapter: base64-encoded PDF + text prompt in, streamed text plus
//! token usage out. Responses are streamed because table extraction runs
//! for minutes; a non-streaming call would sit on an idle socket until the
//! proxy kills it. No retry policy lives here - retries belong to the
//! pipeline, which can see the error variant.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::LlmConfig;
use crate::utils::{ExtractError, ExtractResult};

use super::models::{
    ContentBlock, DocumentSource, LlmResponse, Message, MessagesRequest, StreamEvent,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Streaming Messages API client
pub struct LlmClient {
    http_client: Client,
    base_url: String,
    /// Resolved lazily so commands that never call the LLM (reports,
    /// batch listing) work without a key in the environment
    api_key_env: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> ExtractResult<Self> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    fn api_key(&self) -> ExtractResult<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            ExtractError::Config(format!(
                "API key not found in environment variable '{}'",
                self.api_key_env
            ))
        })
    }

    /// Send one document+prompt message and stream the text response.
    ///
    /// The configured deadline covers the whole exchange, connect through
    /// the last streamed byte. Exceeding it surfaces as
    /// [`ExtractError::Deadline`] so the caller can treat it as transient.
    pub async fn stream_document(
        &self,
        model: &str,
        max_tokens: u32,
        pdf_base64: &str,
        prompt: &str,
    ) -> ExtractResult<LlmResponse> {
        let request = MessagesRequest {
            model,
            max_tokens,
            stream: true,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Document {
                        source: DocumentSource::pdf(pdf_base64),
                    },
                    ContentBlock::Text { text: prompt },
                ],
            }],
        };

        debug!("Calling Messages API: model={} max_tokens={}", model, max_tokens);

        let api_key = self.api_key()?;
        let response = self
            .http_client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ExtractError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if status.is_server_error() {
                return Err(ExtractError::Transport(format!("HTTP {status}: {body}")));
            }
            return Err(ExtractError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        self.collect_stream(response).await
    }

    /// Drain the SSE body, accumulating text deltas and usage counters.
    ///
    /// The buffer stays in bytes until a full frame is available: network
    /// chunks can split multi-byte characters (å, ä, ö in section text),
    /// so decoding per chunk would corrupt them.
    async fn collect_stream(&self, response: reqwest::Response) -> ExtractResult<LlmResponse> {
        let mut result = LlmResponse::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_transport_error(e))?;
            buffer.extend_from_slice(&chunk);

            // SSE frames are separated by a blank line
            while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
                let frame_bytes: Vec<u8> = buffer.drain(..pos + 2).collect();
                let frame = String::from_utf8_lossy(&frame_bytes[..pos]).into_owned();
                self.apply_frame(&frame, &mut result)?;
            }
        }
        // a final frame may arrive without the trailing blank line
        if !buffer.is_empty() {
            let frame = String::from_utf8_lossy(&buffer).into_owned();
            if !frame.trim().is_empty() {
                self.apply_frame(&frame, &mut result)?;
            }
        }

        Ok(result)
    }

    fn apply_frame(&self, frame: &str, result: &mut LlmResponse) -> ExtractResult<()> {
        for line in frame.lines() {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            // unknown event shapes are skipped, not fatal
            let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                continue;
            };

            match event.event_type.as_str() {
                "message_start" => {
                    if let Some(usage) = event.message.and_then(|m| m.usage) {
                        result.input_tokens = usage.input_tokens.unwrap_or(0);
                        result.output_tokens = usage.output_tokens.unwrap_or(0);
                    }
                }
                "content_block_delta" => {
                    if let Some(text) = event.delta.and_then(|d| d.text) {
                        result.full_text.push_str(&text);
                    }
                }
                "message_delta" => {
                    if let Some(usage) = event.usage {
                        if let Some(out) = usage.output_tokens {
                            result.output_tokens = out;
                        }
                    }
                }
                "error" => {
                    let message = event.error.map(|e| e.message).unwrap_or_default();
                    return Err(ExtractError::Transport(format!("stream error: {message}")));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::Deadline(self.timeout.as_secs())
        } else {
            ExtractError::Transport(e.to_string())
        }
    }
}
