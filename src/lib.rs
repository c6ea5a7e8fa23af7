//! # Court-Document Enrichment Pipeline
//!
//! ## Overview
//! This library ingests court-opinion and docket documents from an external
//! legal-data API, enriches them with citation, court, and judge metadata,
//! deduplicates by content fingerprint, and persists merged records with an
//! optional forward to a search index.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `fields`: Judge/court field resolution across heterogeneous document shapes
//! - `citations`: Legal citation extraction and reporter normalization
//! - `dedup`: Content fingerprinting and duplicate detection
//! - `enhancement`: Versioned enhancement markers, checkpoints, and locks
//! - `enrichment`: The per-document enrichment orchestrator and batch pipeline
//! - `storage`: Persistent storage with merge-on-upsert semantics
//! - `sources`: Document source interfaces and the CourtListener client
//! - `sink`: Search index forwarding
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Raw documents (loosely-typed JSON shapes) from a legal-data API
//! - **Output**: Enriched, deduplicated records in persistent storage
//! - **Guarantees**: Idempotent enhancement, at-most-once storage, resumable batches
//!
//! ## Usage
//! ```rust,no_run
//! use docket_enrichment::{Config, enrichment::EnrichmentPipeline, storage::StorageManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let storage = Arc::new(StorageManager::new(config.storage.clone()).await?);
//!     let pipeline = EnrichmentPipeline::new(config.enrichment.clone(), storage).await?;
//!     let result = pipeline.run_batch(Vec::new()).await?;
//!     println!("Processed {} documents", result.stats.documents_processed);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod fields;
pub mod citations;
pub mod dedup;
pub mod merge;
pub mod enhancement;
pub mod enrichment;
pub mod storage;
pub mod sources;
pub mod extract;
pub mod sink;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use errors::{EnrichmentError, Result};
pub use enrichment::{BatchResult, EnrichmentPipeline};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open, order-irrelevant key/value metadata mapping attached to a document.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Prefix marking a document whose text is not yet available and must be
/// recovered from a linked PDF.
pub const PDF_PENDING_PREFIX: &str = "[PDF available:";

/// A raw document as fetched from the external source.
///
/// Documents arrive as loosely-typed mappings from different API endpoints
/// (search hits, opinions, dockets, clusters); `metadata` carries whatever
/// the source provided, untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// External source identifier
    pub source_id: String,
    /// Opinion-cluster grouping key, when the source provides one
    pub cluster_id: Option<String>,
    /// Docket grouping key, when the source provides one
    pub docket_id: Option<String>,
    /// Document text; absent or placeholder text means "pending"
    pub content: Option<String>,
    /// Source-provided metadata, preserved verbatim
    pub metadata: Metadata,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            cluster_id: None,
            docket_id: None,
            content: None,
            metadata: Metadata::new(),
        }
    }

    /// Whether usable text is present. Empty strings and the PDF-pending
    /// placeholder both count as "no content yet".
    pub fn has_content(&self) -> bool {
        match &self.content {
            Some(text) => {
                let trimmed = text.trim();
                !trimmed.is_empty() && !trimmed.starts_with(PDF_PENDING_PREFIX)
            }
            None => false,
        }
    }

    /// URL of the pending PDF, when content is a placeholder.
    pub fn pending_pdf_url(&self) -> Option<&str> {
        let text = self.content.as_deref()?.trim();
        let rest = text.strip_prefix(PDF_PENDING_PREFIX)?;
        Some(rest.trim_start().trim_end_matches(']').trim())
    }

    /// Case or docket number used as a dedup key, best-effort.
    pub fn case_number(&self) -> Option<&str> {
        self.metadata
            .get("docket_number")
            .or_else(|| self.metadata.get("docketNumber"))
            .or_else(|| self.metadata.get("case_number"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A persisted document row.
///
/// `source_id` is the unique row key; `content_hash` is unique across rows
/// and is what makes duplicate inserts observable rather than silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// External source identifier (unique key)
    pub source_id: String,
    /// Document type (opinion, docket, recap document, ...)
    pub doc_type: String,
    /// Full document text (possibly a pending placeholder)
    pub content: String,
    /// Merged metadata
    pub metadata: Metadata,
    /// Content fingerprint, unique across rows
    pub content_hash: String,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}
