//! # Fingerprint and Deduplication Module
//!
//! ## Purpose
//! Computes stable content fingerprints and guarantees at-most-once storage
//! of semantically identical documents within a run, and across runs when
//! reloaded from storage.
//!
//! ## Input/Output Specification
//! - **Input**: Raw documents (identity + text)
//! - **Output**: Hex fingerprints; duplicate verdicts
//! - **Semantics**: A document is duplicate when *any* of three keys has been
//!   seen before: source ID, case number, or content hash (union, not
//!   intersection)
//!
//! ## Key Features
//! - SHA-256 over identity plus a bounded prefix of normalized content
//! - In-memory seen-sets, unbounded within a process lifetime
//! - `reload_from_storage` recovers the sets after a process restart

use crate::storage::StorageManager;
use crate::{RawDocument, Result};
use dashmap::DashSet;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Bound on how much normalized content participates in a hash.
pub const CONTENT_PREFIX_CHARS: usize = 1000;

/// Hash over content alone, for cross-identity duplicate detection.
pub fn content_hash(content: &str) -> String {
    hex_digest(&normalized_prefix(content))
}

/// Composite fingerprint over identity and content prefix.
///
/// Stable for unchanged identity + content; peripheral metadata does not
/// participate.
pub fn fingerprint(source_id: &str, case_number: Option<&str>, content: &str) -> String {
    let composite = format!(
        "{}\n{}\n{}",
        source_id,
        case_number.unwrap_or(""),
        normalized_prefix(content)
    );
    hex_digest(&composite)
}

fn normalized_prefix(content: &str) -> String {
    content
        .nfc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(CONTENT_PREFIX_CHARS)
        .collect()
}

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// In-memory duplicate index over three independent keys.
///
/// Growth is unbounded for the life of the process; run-length correctness
/// is the contract, not an LRU cache.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen_ids: DashSet<String>,
    seen_case_numbers: DashSet<String>,
    seen_content_hashes: DashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any duplicate key matches. The content hash is recorded as a
    /// side effect of the check itself, on first sight.
    pub fn is_duplicate(&self, doc: &RawDocument) -> bool {
        let id_seen = self.seen_ids.contains(&doc.source_id);
        let case_seen = doc
            .case_number()
            .map(|n| self.seen_case_numbers.contains(n))
            .unwrap_or(false);

        // insert() returns false when the hash was already present.
        let hash_seen = if doc.has_content() {
            let hash = content_hash(doc.content.as_deref().unwrap_or(""));
            !self.seen_content_hashes.insert(hash)
        } else {
            false
        };

        id_seen || case_seen || hash_seen
    }

    /// Record a document's identity keys after successful processing.
    pub fn mark_processed(&self, doc: &RawDocument) {
        self.seen_ids.insert(doc.source_id.clone());
        if let Some(case_number) = doc.case_number() {
            self.seen_case_numbers.insert(case_number.to_string());
        }
    }

    /// Drop all in-memory state.
    pub fn reset(&self) {
        self.seen_ids.clear();
        self.seen_case_numbers.clear();
        self.seen_content_hashes.clear();
    }

    /// Repopulate the seen-sets from persisted rows. Run before a new batch
    /// to recover duplicate knowledge after a process restart.
    pub async fn reload_from_storage(&self, storage: &StorageManager) -> Result<usize> {
        self.reset();
        let records = storage.all_records().await?;
        let count = records.len();

        for record in records {
            self.seen_ids.insert(record.source_id.clone());
            if let Some(case_number) = record
                .metadata
                .get("docket_number")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
            {
                self.seen_case_numbers.insert(case_number.to_string());
            }
            if !record.content.trim().is_empty() {
                self.seen_content_hashes.insert(content_hash(&record.content));
            }
        }

        tracing::info!("Dedup index reloaded from storage: {} records", count);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.seen_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, case_number: Option<&str>, content: Option<&str>) -> RawDocument {
        let mut d = RawDocument::new(id);
        if let Some(n) = case_number {
            d.metadata.insert("docket_number".into(), json!(n));
        }
        d.content = content.map(str::to_string);
        d
    }

    #[test]
    fn test_fingerprint_stable_and_metadata_independent() {
        let a = fingerprint("X1", Some("1:20-cv-100"), "The court finds...");
        let b = fingerprint("X1", Some("1:20-cv-100"), "The  court\nfinds...");
        let c = fingerprint("X2", Some("1:20-cv-100"), "The court finds...");

        // Whitespace normalization collapses to the same prefix.
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_by_source_id() {
        let index = DedupIndex::new();
        let first = doc("X1", None, Some("text"));
        assert!(!index.is_duplicate(&first));
        index.mark_processed(&first);

        let again = doc("X1", None, Some("different text"));
        assert!(index.is_duplicate(&again));
    }

    #[test]
    fn test_duplicate_by_case_number() {
        let index = DedupIndex::new();
        let first = doc("X1", Some("1:20-cv-100"), Some("alpha"));
        assert!(!index.is_duplicate(&first));
        index.mark_processed(&first);

        let other = doc("X2", Some("1:20-cv-100"), Some("beta"));
        assert!(index.is_duplicate(&other));
    }

    #[test]
    fn test_duplicate_by_content_hash_alone() {
        // Union semantics: different ID, different case number, identical
        // text is still a duplicate.
        let index = DedupIndex::new();
        let shared = "Identical opinion body shared by both records.";
        let first = doc("A1", Some("1:20-cv-1"), Some(shared));
        assert!(!index.is_duplicate(&first));
        index.mark_processed(&first);

        let second = doc("B2", Some("9:99-cv-9"), Some(shared));
        assert!(index.is_duplicate(&second));
    }

    #[test]
    fn test_empty_content_never_hash_collides() {
        let index = DedupIndex::new();
        let first = doc("A1", None, None);
        let second = doc("B2", None, Some("   "));

        assert!(!index.is_duplicate(&first));
        index.mark_processed(&first);
        assert!(!index.is_duplicate(&second));
    }

    #[test]
    fn test_reset_clears_state() {
        let index = DedupIndex::new();
        let d = doc("X1", None, Some("text"));
        index.mark_processed(&d);
        assert!(!index.is_empty());

        index.reset();
        assert!(index.is_empty());
        assert!(!index.is_duplicate(&d));
    }
}
