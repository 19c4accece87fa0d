//! Embedding Worker - attaches a vector to every persisted section.
//!
//! Sections are embedded as `title + "\n\n" + content`, in batches of up
//! to ten inputs per Voyage request. Any section already carrying a
//! vector is skipped, so draining is idempotent and resumable.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::services::store::{SectionForEmbedding, Store};
use crate::utils::{ExtractError, ExtractResult};

/// Expected vector width from the embeddings endpoint
pub const EMBEDDING_DIM: usize = 1024;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct EmbeddingService {
    store: Store,
    http_client: Client,
    config: EmbeddingConfig,
    api_key: String,
}

impl EmbeddingService {
    pub fn new(store: Store, config: EmbeddingConfig) -> ExtractResult<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ExtractError::Config(format!(
                "embedding API key not found in environment variable '{}'",
                config.api_key_env
            ))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            store,
            http_client,
            config,
            api_key,
        })
    }

    /// Embed every section of a company that lacks a vector.
    /// Returns the number of sections updated.
    pub async fn backfill_company(&self, company_id: &str) -> ExtractResult<usize> {
        let pending = self.store.sections_without_embedding(company_id).await?;
        let pending: Vec<SectionForEmbedding> = pending
            .into_iter()
            .filter(|s| !s.content.trim().is_empty())
            .collect();

        if pending.is_empty() {
            info!("All sections already have embeddings");
            return Ok(0);
        }
        info!("{} section(s) need embeddings", pending.len());

        let mut processed = 0;
        for (i, batch) in pending.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<String> = batch
                .iter()
                .map(|s| {
                    format!(
                        "{}\n\n{}",
                        s.title.as_deref().unwrap_or_default(),
                        s.content
                    )
                })
                .collect();

            debug!("Embedding batch {} ({} inputs)", i + 1, texts.len());
            let vectors = self.embed_documents(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(ExtractError::Malformed(format!(
                    "embedding endpoint returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (section, vector) in batch.iter().zip(vectors) {
                if vector.len() != EMBEDDING_DIM {
                    warn!(
                        "Section {} got a {}-dim vector, expected {}",
                        section.row_id,
                        vector.len(),
                        EMBEDDING_DIM
                    );
                }
                self.store
                    .set_section_embedding(section.row_id, &vector)
                    .await?;
                processed += 1;
            }

            // brief pause between batches keeps us clear of the rate limit
            if (i + 1) * self.config.batch_size < pending.len() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        info!("Embedding backfill done: {} section(s) updated", processed);
        Ok(processed)
    }

    /// One embeddings request with 429 backoff: wait 5·2^n seconds,
    /// up to the configured retry ceiling.
    async fn embed_documents(&self, texts: &[String]) -> ExtractResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts.iter().map(|t| t.as_str()).collect(),
            input_type: "document",
        };

        for attempt in 0..self.config.max_retries {
            let response = self
                .http_client
                .post(&self.config.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ExtractError::Deadline(60)
                    } else {
                        ExtractError::Transport(e.to_string())
                    }
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = 5 * 2u64.pow(attempt);
                warn!("Embedding API rate limited, waiting {}s", wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
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

            let decoded: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| ExtractError::Malformed(format!("embedding response: {e}")))?;
            return Ok(decoded.data.into_iter().map(|d| d.embedding).collect());
        }

        Err(ExtractError::RateLimited(5 * 2u64.pow(self.config.max_retries)))
    }
}
