use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Application configuration.
///
/// Loading order (priority from highest to lowest):
/// 1. Command line overrides (applied by `main`)
/// 2. Environment variables
/// 3. Configuration file (databok.toml)
/// 4. Default values
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/databok.db?mode=rwc".to_string(),
        }
    }
}

/// Anthropic Messages API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Environment variable holding the API key (never the key itself)
    pub api_key_env: String,
    pub base_url: Option<String>,
    /// Model for structure, narrative and repair passes
    pub low_cost_model: String,
    /// Model for table extraction
    pub premium_model: String,
    /// Per-request deadline covering the full streamed exchange
    pub timeout_seconds: u64,
    /// Width of the semaphore capping concurrent LLM requests
    pub max_concurrent: usize,
    pub structure_max_tokens: u32,
    pub tables_max_tokens: u32,
    pub narrative_max_tokens: u32,
    pub repair_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            low_cost_model: "claude-haiku-4-5-20251001".to_string(),
            premium_model: "claude-sonnet-4-5-20250929".to_string(),
            timeout_seconds: 300,
            max_concurrent: 5,
            structure_max_tokens: 16_000,
            tables_max_tokens: 60_000,
            narrative_max_tokens: 32_000,
            repair_max_tokens: 32_000,
        }
    }
}

/// Voyage embeddings API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    /// Inputs per request; the endpoint accepts far more but small batches
    /// keep 429 recovery cheap
    pub batch_size: usize,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key_env: "VOYAGE_API_KEY".to_string(),
            base_url: "https://api.voyageai.com/v1/embeddings".to_string(),
            model: "voyage-4".to_string(),
            batch_size: 10,
            max_retries: 5,
        }
    }
}

/// Batch extraction settings and directory conventions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base folder containing one subfolder per company slug
    pub base_folder: String,
    /// Input subdirectory inside each company folder
    pub pending_dir: String,
    /// Post-extraction subdirectory inside each company folder
    pub persisted_dir: String,
    /// Checkpoint document, relative to the base folder
    pub checkpoint_file: String,
    /// Retry ceiling per PDF
    pub max_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_folder: "reports".to_string(),
            pending_dir: "pending".to_string(),
            persisted_dir: "persisted".to_string(),
            checkpoint_file: "extraction_checkpoint.json".to_string(),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env-filter directive, e.g. "info,rapport_extraktor=debug"
    pub level: String,
    /// Also write a per-run log file into the company folder
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment
    /// variables. CLI overrides are applied afterwards by the caller.
    pub fn load(config_path: Option<&str>) -> Result<Self, anyhow::Error> {
        let path = config_path
            .map(|p| p.to_string())
            .or_else(Self::find_config_file);

        let mut config = match path {
            Some(path) => Self::from_toml(&path)?,
            None => {
                tracing::debug!("Configuration file not found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<String> {
        ["databok.toml", "config/databok.toml"]
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {path}: {e}"))?;
        Ok(config)
    }

    /// Supported environment variables:
    /// - DATABASE_URL: SQLite connection string
    /// - DATABOK_BASE_FOLDER: reports base folder
    /// - DATABOK_LOG_LEVEL: env-filter directive
    /// - DATABOK_MAX_CONCURRENT: LLM concurrency cap
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(folder) = std::env::var("DATABOK_BASE_FOLDER") {
            self.extraction.base_folder = folder;
        }
        if let Ok(level) = std::env::var("DATABOK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(n) = std::env::var("DATABOK_MAX_CONCURRENT") {
            if let Ok(n) = n.parse::<usize>() {
                self.llm.max_concurrent = n;
            }
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.llm.max_concurrent == 0 {
            anyhow::bail!("llm.max_concurrent must be at least 1");
        }
        if self.llm.timeout_seconds == 0 {
            anyhow::bail!("llm.timeout_seconds must be at least 1");
        }
        if self.embedding.batch_size == 0 || self.embedding.batch_size > 128 {
            anyhow::bail!("embedding.batch_size must be between 1 and 128");
        }
        if self.extraction.max_attempts == 0 {
            anyhow::bail!("extraction.max_attempts must be at least 1");
        }
        Ok(())
    }
}
