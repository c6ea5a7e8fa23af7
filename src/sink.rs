//! # Search Sink Module
//!
//! ## Purpose
//! Forwards stored documents to an external search index. Indexing is
//! best-effort: a rejected batch is logged and retried at most once, and
//! never blocks storage.
//!
//! ## Input/Output Specification
//! - **Input**: Batches of content + metadata pairs
//! - **Output**: Accepted counts from the sink
//! - **Failure mode**: non-2xx responses are soft failures

use crate::errors::{EnrichmentError, Result};
use crate::Metadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One document in sink wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkDocument {
    pub content: String,
    pub meta: Metadata,
}

/// Result of one ingest call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResult {
    pub accepted: usize,
}

/// Search index ingest contract.
#[async_trait]
pub trait SearchSink: Send + Sync {
    async fn ingest(&self, documents: &[SinkDocument]) -> Result<IngestResult>;
}

/// HTTP search sink client.
pub struct HttpSearchSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchSink {
    pub fn new(endpoint: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SearchSink for HttpSearchSink {
    async fn ingest(&self, documents: &[SinkDocument]) -> Result<IngestResult> {
        if documents.is_empty() {
            return Ok(IngestResult::default());
        }

        let response = self.client.post(&self.endpoint).json(documents).send().await?;

        if !response.status().is_success() {
            return Err(EnrichmentError::SinkRejected {
                details: format!("HTTP {}", response.status()),
            });
        }

        Ok(IngestResult {
            accepted: documents.len(),
        })
    }
}

/// Forward a batch, retrying once on a soft failure. Errors are reported to
/// the caller as a count, never propagated.
pub async fn forward_best_effort(sink: &dyn SearchSink, documents: &[SinkDocument]) -> usize {
    match sink.ingest(documents).await {
        Ok(result) => result.accepted,
        Err(first) => {
            tracing::warn!("Search sink rejected batch ({}), retrying once", first);
            match sink.ingest(documents).await {
                Ok(result) => result.accepted,
                Err(second) => {
                    tracing::warn!("Search sink retry failed: {}", second);
                    0
                }
            }
        }
    }
}
