//! Configuration management for drivedex
//!
//! Handles loading and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_TOP_K: usize = 50;
const MIN_CONTEXT_CHARS: usize = 500;
const MAX_CONTEXT_CHARS: usize = 100_000;
const MAX_WORKERS: usize = 64;
const MAX_RPS: f64 = 1000.0;
const MAX_BURST: f64 = 10_000.0;
const MAX_SHUTDOWN_GRACE_SECS: u64 = 600;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Remote Drive API configuration
    #[serde(default)]
    pub drive: DriveConfig,

    /// Rate limiting of remote API calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry/backoff policy for remote API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Ingest run configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Per-format enable flags and size ceilings
    #[serde(default)]
    pub formats: FormatConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding HTTP service
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Remote Drive API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// API base URL (overridable for tests)
    #[serde(default = "default_drive_base_url")]
    pub base_url: String,

    /// Environment variable holding the access token
    #[serde(default = "default_drive_token_env")]
    pub access_token_env: String,

    /// Root folder ids for the scoped walk
    #[serde(default)]
    pub root_folder_ids: Vec<String>,

    /// Index every file the credential can reach instead of walking roots
    #[serde(default)]
    pub all_accessible: bool,

    /// Page size for listing calls
    #[serde(default = "default_drive_page_size")]
    pub page_size: u32,

    /// Row cap applied when reading spreadsheet values
    #[serde(default = "default_max_rows_per_sheet")]
    pub max_rows_per_sheet: u32,
}

/// Token bucket parameters shared by all workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second
    #[serde(default = "default_rate_limit_rps")]
    pub rps: f64,

    /// Maximum bucket size
    #[serde(default = "default_rate_limit_burst")]
    pub burst: f64,
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retry budget per operation
    #[serde(default = "default_retry_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in seconds
    #[serde(default = "default_retry_base_delay_secs")]
    pub base_delay_secs: f64,

    /// Backoff delay cap in seconds
    #[serde(default = "default_retry_max_delay_secs")]
    pub max_delay_secs: f64,
}

/// Ingest run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Run mode: "once" or "loop"
    #[serde(default = "default_ingest_mode")]
    pub mode: String,

    /// Seconds between passes in loop mode
    #[serde(default = "default_ingest_poll_secs")]
    pub poll_secs: u64,

    /// Worker pool width
    #[serde(default = "default_ingest_workers")]
    pub workers: usize,

    /// Emit a progress line every N completed files
    #[serde(default = "default_progress_every_files")]
    pub progress_every_files: u64,

    /// Emit a progress line at least every T seconds
    #[serde(default = "default_progress_every_secs")]
    pub progress_every_secs: u64,

    /// Grace period for in-flight work on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Per-format enable flags and size ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "default_format_enabled")]
    pub gdocs_enabled: bool,

    #[serde(default = "default_format_enabled")]
    pub gsheets_enabled: bool,

    #[serde(default = "default_format_enabled")]
    pub gslides_enabled: bool,

    #[serde(default = "default_format_enabled")]
    pub text_enabled: bool,

    #[serde(default = "default_format_enabled")]
    pub pdf_enabled: bool,

    #[serde(default = "default_format_enabled")]
    pub office_enabled: bool,

    /// Size ceiling for text/code files in megabytes
    #[serde(default = "default_text_max_file_size_mb")]
    pub text_max_file_size_mb: u64,

    /// Size ceiling for PDF files in megabytes
    #[serde(default = "default_pdf_max_file_size_mb")]
    pub pdf_max_file_size_mb: u64,

    /// Size ceiling for Office files in megabytes
    #[serde(default = "default_office_max_file_size_mb")]
    pub office_max_file_size_mb: u64,

    /// Page cap for PDF extraction
    #[serde(default = "default_pdf_max_pages")]
    pub pdf_max_pages: usize,

    /// Sheet cap for workbook extraction
    #[serde(default = "default_excel_max_sheets")]
    pub excel_max_sheets: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of nearest neighbours to retrieve
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Context assembly budget in characters
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_url: default_drive_base_url(),
            access_token_env: default_drive_token_env(),
            root_folder_ids: Vec::new(),
            all_accessible: false,
            page_size: default_drive_page_size(),
            max_rows_per_sheet: default_max_rows_per_sheet(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: default_rate_limit_rps(),
            burst: default_rate_limit_burst(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_retry_max_retries(),
            base_delay_secs: default_retry_base_delay_secs(),
            max_delay_secs: default_retry_max_delay_secs(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: default_ingest_mode(),
            poll_secs: default_ingest_poll_secs(),
            workers: default_ingest_workers(),
            progress_every_files: default_progress_every_files(),
            progress_every_secs: default_progress_every_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            gdocs_enabled: true,
            gsheets_enabled: true,
            gslides_enabled: true,
            text_enabled: true,
            pdf_enabled: true,
            office_enabled: true,
            text_max_file_size_mb: default_text_max_file_size_mb(),
            pdf_max_file_size_mb: default_pdf_max_file_size_mb(),
            office_max_file_size_mb: default_office_max_file_size_mb(),
            pdf_max_pages: default_pdf_max_pages(),
            excel_max_sheets: default_excel_max_sheets(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            drive: DriveConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            ingest: IngestConfig::default(),
            formats: FormatConfig::default(),
            chunk: ChunkConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivedex")
            .join("config.toml")
    }

    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            debug!("Config file {} not found, using defaults", path.display());
            Config::default()
        };

        Ok(config)
    }

    /// Validate value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        match self.ingest.mode.as_str() {
            "once" | "loop" => {}
            other => {
                return Err(Error::Config(format!(
                    "ingest.mode must be 'once' or 'loop', got '{}'",
                    other
                )))
            }
        }

        if self.ingest.workers < 1 || self.ingest.workers > MAX_WORKERS {
            return Err(Error::Config(format!(
                "ingest.workers must be in range [1..{}]",
                MAX_WORKERS
            )));
        }

        if self.rate_limit.rps <= 0.0 || self.rate_limit.rps > MAX_RPS {
            return Err(Error::Config(format!(
                "rate_limit.rps must be in range (0..{}]",
                MAX_RPS
            )));
        }

        if self.rate_limit.burst < 1.0 || self.rate_limit.burst > MAX_BURST {
            return Err(Error::Config(format!(
                "rate_limit.burst must be in range [1..{}]",
                MAX_BURST
            )));
        }

        if self.retry.base_delay_secs <= 0.0 || self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(Error::Config(
                "retry delays must satisfy 0 < base_delay_secs <= max_delay_secs".to_string(),
            ));
        }

        if self.query.top_k < 1 || self.query.top_k > MAX_TOP_K {
            return Err(Error::Config(format!(
                "query.top_k must be in range [1..{}]",
                MAX_TOP_K
            )));
        }

        if self.query.max_context_chars < MIN_CONTEXT_CHARS
            || self.query.max_context_chars > MAX_CONTEXT_CHARS
        {
            return Err(Error::Config(format!(
                "query.max_context_chars must be in range [{}..{}]",
                MIN_CONTEXT_CHARS, MAX_CONTEXT_CHARS
            )));
        }

        if self.ingest.shutdown_grace_secs > MAX_SHUTDOWN_GRACE_SECS {
            return Err(Error::Config(format!(
                "ingest.shutdown_grace_secs must be at most {}",
                MAX_SHUTDOWN_GRACE_SECS
            )));
        }

        if self.chunk.max_chars == 0 || self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be smaller than chunk.max_chars".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that a crawl scope is configured; required for ingestion only
    pub fn validate_scope(&self) -> Result<()> {
        if !self.drive.all_accessible && self.drive.root_folder_ids.is_empty() {
            return Err(Error::Config(
                "set drive.root_folder_ids or drive.all_accessible = true".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.drive.root_folder_ids = vec!["root-a".to_string()];
        config
    }

    #[test]
    fn test_defaults_have_no_scope() {
        // Defaults validate, but ingestion needs an explicit scope.
        Config::default().validate().unwrap();
        let err = Config::default().validate_scope().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn test_mode_validation() {
        let mut config = valid_config();
        config.ingest.mode = "forever".to_string();
        assert!(config.validate().is_err());

        config.ingest.mode = "once".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_bounds() {
        let mut config = valid_config();
        config.rate_limit.rps = 0.0;
        assert!(config.validate().is_err());

        config.rate_limit.rps = 8.0;
        config.rate_limit.burst = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_overlap_must_be_smaller_than_size() {
        let mut config = valid_config();
        config.chunk.max_chars = 100;
        config.chunk.overlap_chars = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.drive.all_accessible);
        assert_eq!(config.query.top_k, 6);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "collection_name = \"notes\"\n[drive]\nall_accessible = true\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.collection_name, "notes");
        assert!(config.drive.all_accessible);
        assert_eq!(config.chunk.max_chars, 900);
    }
}
