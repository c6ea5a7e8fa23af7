//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the enrichment pipeline, supporting TOML
//! files, environment variable overrides, and validation with detailed
//! error messages.
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Command line arguments (highest priority, applied by the binary)
//! 2. Environment variables
//! 3. Configuration files
//! 4. Default values (lowest priority)
//!
//! ## Usage
//! ```rust,no_run
//! use docket_enrichment::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Batch size: {}", config.enrichment.batch_size);
//! ```

use crate::errors::{EnrichmentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// External document source settings
    pub source: CourtListenerConfig,
    /// Enrichment pipeline behavior
    pub enrichment: EnrichmentConfig,
    /// Storage and database settings
    pub storage: StorageConfig,
    /// Search sink forwarding
    pub sink: SinkConfig,
    /// PDF/OCR text extraction service
    pub extraction: ExtractionConfig,
    /// Retry behavior for network operations
    pub retry: RetryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// CourtListener API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtListenerConfig {
    /// API base URL
    pub base_url: String,
    /// API authentication token
    pub api_token: Option<String>,
    /// Results per page
    pub page_size: usize,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Rate limit: requests per minute
    pub rate_limit_rpm: u32,
}

/// Enrichment pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Documents per batch
    pub batch_size: usize,
    /// Concurrent per-document enrichment tasks
    pub max_concurrent_enrichments: usize,
    /// Version stamped into enhancement markers; bumping it forces
    /// re-enhancement of the corpus
    pub enhancement_version: String,
    /// Skip documents whose marker already matches the current version
    pub skip_enhanced: bool,
    /// Source table/collection name recorded in checkpoints
    pub collection: String,
    /// Cooperative lock TTL in minutes
    pub lock_ttl_minutes: i64,
    /// Forward stored documents to the search sink
    pub forward_to_sink: bool,
}

/// Storage and database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory path
    pub db_path: PathBuf,
    /// Gzip record values on disk
    pub enable_compression: bool,
}

/// Search sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Enable forwarding at all
    pub enabled: bool,
    /// Ingest endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// PDF/OCR extraction service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Enable text recovery for pending PDFs
    pub enabled: bool,
    /// Extraction service endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Retry configuration for network operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts including the first
    pub max_attempts: u32,
    /// Base delay before the first retry (ms)
    pub base_delay_ms: u64,
    /// Cap on the backoff delay (ms)
    pub max_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when the file does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| EnrichmentError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| EnrichmentError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(token) = std::env::var("DOCKET_ENRICHMENT_API_TOKEN") {
            self.source.api_token = Some(token);
        }
        if let Ok(db_path) = std::env::var("DOCKET_ENRICHMENT_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(level) = std::env::var("DOCKET_ENRICHMENT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(endpoint) = std::env::var("DOCKET_ENRICHMENT_SINK_URL") {
            self.sink.endpoint = endpoint;
            self.sink.enabled = true;
        }
        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.enrichment.batch_size == 0 {
            return Err(EnrichmentError::Config {
                message: "enrichment.batch_size must be greater than zero".to_string(),
            });
        }
        if !(1..=32).contains(&self.enrichment.max_concurrent_enrichments) {
            return Err(EnrichmentError::Config {
                message: "enrichment.max_concurrent_enrichments must be between 1 and 32"
                    .to_string(),
            });
        }
        if self.enrichment.enhancement_version.trim().is_empty() {
            return Err(EnrichmentError::Config {
                message: "enrichment.enhancement_version cannot be empty".to_string(),
            });
        }
        if self.source.page_size == 0 {
            return Err(EnrichmentError::Config {
                message: "source.page_size must be greater than zero".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(EnrichmentError::Config {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.sink.enabled && self.sink.endpoint.trim().is_empty() {
            return Err(EnrichmentError::Config {
                message: "sink.endpoint required when sink.enabled".to_string(),
            });
        }
        if self.extraction.enabled && self.extraction.endpoint.trim().is_empty() {
            return Err(EnrichmentError::Config {
                message: "extraction.endpoint required when extraction.enabled".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: CourtListenerConfig {
                base_url: "https://www.courtlistener.com/api/rest/v4".to_string(),
                api_token: None,
                page_size: 100,
                timeout_seconds: 30,
                rate_limit_rpm: 60,
            },
            enrichment: EnrichmentConfig {
                batch_size: 100,
                max_concurrent_enrichments: 4.min(num_cpus::get().max(1)),
                enhancement_version: "1.0".to_string(),
                skip_enhanced: true,
                collection: "court_documents".to_string(),
                lock_ttl_minutes: 30,
                forward_to_sink: false,
            },
            storage: StorageConfig {
                db_path: PathBuf::from("./data/enrichment.db"),
                enable_compression: true,
            },
            sink: SinkConfig {
                enabled: false,
                endpoint: String::new(),
                timeout_seconds: 30,
            },
            extraction: ExtractionConfig {
                enabled: false,
                endpoint: String::new(),
                timeout_seconds: 60,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 500,
                max_delay_ms: 30_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.enrichment.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enabled_sink_requires_endpoint() {
        let mut config = Config::default();
        config.sink.enabled = true;
        config.sink.endpoint = String::new();
        assert!(config.validate().is_err());

        config.sink.endpoint = "http://localhost:7700/ingest".to_string();
        assert!(config.validate().is_ok());
    }
}
