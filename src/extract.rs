//! # Text Extraction Interface
//!
//! ## Purpose
//! Interface to the external PDF/OCR extraction service. The service itself
//! is a collaborator; this module only defines the contract the pipeline
//! consumes: give it a PDF location, get text back or `None` on failure.

use async_trait::async_trait;
use std::time::Duration;

/// External text extraction contract. Returns `None` on failure; the
/// pipeline falls back to whatever placeholder content already exists.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, pdf_url: &str) -> Option<String>;
}

/// Extractor that never recovers text. Used when no extraction service is
/// configured; pending documents stay pending.
pub struct NoopExtractor;

#[async_trait]
impl TextExtractor for NoopExtractor {
    async fn extract_text(&self, _pdf_url: &str) -> Option<String> {
        None
    }
}

/// HTTP extraction service client: POSTs the PDF URL, expects plain text
/// back.
pub struct HttpTextExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTextExtractor {
    pub fn new(endpoint: impl Into<String>, timeout_seconds: u64) -> crate::Result<Self> {
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
impl TextExtractor for HttpTextExtractor {
    async fn extract_text(&self, pdf_url: &str) -> Option<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": pdf_url }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) if !text.trim().is_empty() => Some(text),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Extraction response unreadable for {}: {}", pdf_url, e);
                    None
                }
            },
            Ok(resp) => {
                tracing::warn!(
                    "Extraction failed for {}: HTTP {}",
                    crate::utils::truncate(pdf_url, 120),
                    resp.status()
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Extraction request failed for {}: {}",
                    crate::utils::truncate(pdf_url, 120),
                    e
                );
                None
            }
        }
    }
}
