//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the enrichment pipeline, providing
//! structured error types with context for every stage of processing.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from sources, enrichment stages, and storage
//! - **Output**: Structured error types with document/stage attribution
//! - **Error Categories**: Source, Enrichment, Storage, Sink, Configuration
//!
//! ## Key Features
//! - Per-document errors carry the document ID and stage name so batch
//!   results stay attributable
//! - `is_recoverable()` distinguishes retryable network conditions from
//!   fatal storage failures
//! - Automatic conversion from common library error types

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, EnrichmentError>;

/// Comprehensive error types for the enrichment pipeline
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Network-related errors
    #[error("Network error: {details}")]
    Network { details: String },

    /// Rate limiting from the external source
    #[error("Rate limit exceeded for {source_name}")]
    RateLimitExceeded {
        source_name: String,
        retry_after_seconds: Option<u64>,
    },

    /// The source reported the document as still processing
    #[error("Document {document_id} still processing at source")]
    StillProcessing { document_id: String },

    /// Retries exhausted against the external source
    #[error("Retries exhausted for {operation} after {attempts} attempts: {details}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        details: String,
    },

    /// Data parsing errors
    #[error("Failed to parse data from {source_name}: {details}")]
    DataParsing { source_name: String, details: String },

    /// A single document failed inside a named enrichment stage
    #[error("Document {document_id} failed at stage '{stage}': {details}")]
    StageFailed {
        document_id: String,
        stage: String,
        details: String,
    },

    /// Validation errors (recorded, never fatal to a batch)
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// A row with this content hash already exists under another ID
    #[error("Duplicate content: hash {hash} already stored for document {existing_id}")]
    DuplicateContent { hash: String, existing_id: String },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Database open/connection failures
    #[error("Database connection failed: {db_path} - {reason}")]
    DatabaseConnectionFailed { db_path: String, reason: String },

    /// Storage transaction failure; aborts the whole batch
    #[error("Storage transaction failed: {details}")]
    TransactionFailed { details: String },

    /// Binary serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Search sink rejected an ingest batch
    #[error("Search sink error: {details}")]
    SinkRejected { details: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EnrichmentError {
    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EnrichmentError::Network { .. }
                | EnrichmentError::RateLimitExceeded { .. }
                | EnrichmentError::StillProcessing { .. }
                | EnrichmentError::SinkRejected { .. }
        )
    }

    /// Whether the error must abort the whole batch rather than one document
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnrichmentError::Database(_)
                | EnrichmentError::DatabaseConnectionFailed { .. }
                | EnrichmentError::TransactionFailed { .. }
                | EnrichmentError::Config { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            EnrichmentError::Network { .. }
            | EnrichmentError::RateLimitExceeded { .. }
            | EnrichmentError::StillProcessing { .. }
            | EnrichmentError::RetriesExhausted { .. }
            | EnrichmentError::Http(_)
            | EnrichmentError::DataParsing { .. } => "source",
            EnrichmentError::StageFailed { .. }
            | EnrichmentError::ValidationFailed { .. }
            | EnrichmentError::Json(_) => "enrichment",
            EnrichmentError::DuplicateContent { .. }
            | EnrichmentError::Database(_)
            | EnrichmentError::DatabaseConnectionFailed { .. }
            | EnrichmentError::TransactionFailed { .. }
            | EnrichmentError::Serialization(_) => "storage",
            EnrichmentError::SinkRejected { .. } => "sink",
            EnrichmentError::Config { .. } | EnrichmentError::Toml(_) => "configuration",
            EnrichmentError::Internal { .. } => "generic",
        }
    }
}

impl From<std::io::Error> for EnrichmentError {
    fn from(err: std::io::Error) -> Self {
        EnrichmentError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

/// Helper macro for internal errors
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::EnrichmentError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EnrichmentError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}
