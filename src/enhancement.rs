//! # Progressive Enhancement Module
//!
//! ## Purpose
//! Makes long-running enhancement passes over a corpus safe to re-run and
//! safe to resume: a version-stamped completion marker in document metadata
//! makes enhancement idempotent, checkpoints carry batch progress across
//! process restarts, and a cooperative per-document lock keeps two workers
//! from enhancing the same document at once.
//!
//! ## Input/Output Specification
//! - **Input**: Document metadata mappings, an enhancement function, version
//! - **Output**: Marked metadata, per-batch outcome counters, checkpoints
//! - **Idempotence**: A completed marker at the current version makes the
//!   document a no-op; a version mismatch forces re-enhancement
//!
//! ## Key Features
//! - Pure `mark_document_enhanced`; callers capture the returned mapping
//! - One document's failure never aborts a batch
//! - Compare-and-clear lock release

use crate::errors::Result;
use crate::{Metadata, RawDocument};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;

/// Default namespace for the enhancement marker sub-object.
pub const DEFAULT_ENHANCEMENT_KEY: &str = "docket_enrichment";

/// Versioned, namespaced enhancement pass over document metadata.
pub struct ProgressiveEnhancer {
    key: String,
    version: String,
}

/// Outcome of one batch enhancement call. Always returned in full, even on
/// partial failure, so callers can tell "nothing happened" from "mostly
/// succeeded".
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchEnhanceOutcome {
    /// Documents whose metadata now carries a fresh marker
    pub enhanced: Vec<RawDocument>,
    /// Source IDs skipped because they were already enhanced
    pub skipped: Vec<String>,
    /// Per-document failures with attribution
    pub errors: Vec<BatchItemError>,
}

/// A single document's failure inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemError {
    pub document_id: String,
    pub message: String,
}

impl ProgressiveEnhancer {
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_key(DEFAULT_ENHANCEMENT_KEY, version)
    }

    pub fn with_key(key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// True only when the marker exists, its version matches the current
    /// version, and it is flagged complete. A version mismatch reads as
    /// "not enhanced" so version bumps invalidate prior passes.
    pub fn check_if_already_enhanced(&self, metadata: &Metadata) -> bool {
        let marker = match metadata.get(&self.key) {
            Some(Value::Object(marker)) => marker,
            _ => return false,
        };

        let version_matches = marker
            .get("enhancement_version")
            .and_then(|v| v.as_str())
            .map(|v| v == self.version)
            .unwrap_or(false);
        let complete = marker
            .get("enhancement_complete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        version_matches && complete
    }

    /// Return a new metadata mapping equal to the input plus a fresh marker.
    /// The input is never mutated; callers must capture the return value.
    pub fn mark_document_enhanced(
        &self,
        metadata: &Metadata,
        enhancements: Metadata,
        extra: Option<Metadata>,
    ) -> Metadata {
        let mut marker = Metadata::new();
        marker.insert("enhanced_at".into(), json!(Utc::now().to_rfc3339()));
        marker.insert("enhancement_version".into(), json!(self.version));
        marker.insert("enhancement_complete".into(), json!(true));
        marker.insert("enhancements".into(), Value::Object(enhancements));
        if let Some(extra) = extra {
            for (k, v) in extra {
                marker.insert(k, v);
            }
        }

        let mut out = metadata.clone();
        out.insert(self.key.clone(), Value::Object(marker));
        out
    }

    /// Run `enhance` over a batch. Already-enhanced documents are skipped
    /// when `skip_enhanced`; a failing document is recorded and the batch
    /// continues.
    pub async fn batch_enhance_documents<F, Fut>(
        &self,
        docs: Vec<RawDocument>,
        mut enhance: F,
        skip_enhanced: bool,
    ) -> BatchEnhanceOutcome
    where
        F: FnMut(RawDocument) -> Fut,
        Fut: Future<Output = Result<Metadata>>,
    {
        let mut outcome = BatchEnhanceOutcome::default();

        for doc in docs {
            if skip_enhanced && self.check_if_already_enhanced(&doc.metadata) {
                tracing::debug!("Document {} already enhanced, skipping", doc.source_id);
                outcome.skipped.push(doc.source_id.clone());
                continue;
            }

            let source_id = doc.source_id.clone();
            let metadata = doc.metadata.clone();
            match enhance(doc.clone()).await {
                Ok(enhancements) => {
                    let mut enhanced = doc;
                    enhanced.metadata = self.mark_document_enhanced(&metadata, enhancements, None);
                    outcome.enhanced.push(enhanced);
                }
                Err(e) => {
                    tracing::warn!("Enhancement failed for document {}: {}", source_id, e);
                    outcome.errors.push(BatchItemError {
                        document_id: source_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome
    }
}

/// Running counters snapshotted into every checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointCounters {
    pub checked: usize,
    pub enhanced: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Progress marker for resumable batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last successfully processed document ID
    pub last_processed_id: String,
    /// Source table/collection the pass is iterating
    pub collection: String,
    /// Session that produced this checkpoint
    pub session_id: String,
    /// When the checkpoint was written
    pub timestamp: DateTime<Utc>,
    pub counters: CheckpointCounters,
    /// Caller-defined state carried along with the checkpoint
    #[serde(default)]
    pub extra: Metadata,
}

impl Checkpoint {
    pub fn new(
        last_processed_id: impl Into<String>,
        collection: impl Into<String>,
        session_id: impl Into<String>,
        extra: Option<Metadata>,
    ) -> Self {
        Self {
            last_processed_id: last_processed_id.into(),
            collection: collection.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            counters: CheckpointCounters::default(),
            extra: extra.unwrap_or_default(),
        }
    }

    /// Record progress. Advancement is monotonic per session: an ID that
    /// sorts at or before the current one is ignored.
    pub fn advance(&mut self, id: &str, counters: CheckpointCounters) {
        if id_precedes(id, &self.last_processed_id) {
            tracing::warn!(
                "Checkpoint advance ignored: {} does not follow {}",
                id,
                self.last_processed_id
            );
            return;
        }
        self.last_processed_id = id.to_string();
        self.counters = counters;
        self.timestamp = Utc::now();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Round-trip a checkpoint from its serialized form to continue a batch
    /// after the recorded ID.
    pub fn resume(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Whether `id` was already processed under this checkpoint.
    pub fn covers(&self, id: &str) -> bool {
        id_precedes(id, &self.last_processed_id)
    }
}

/// Numeric-aware ordering: numeric IDs compare as numbers, everything else
/// lexicographically.
fn id_precedes(candidate: &str, current: &str) -> bool {
    if current.is_empty() {
        return false;
    }
    match (candidate.parse::<u64>(), current.parse::<u64>()) {
        (Ok(a), Ok(b)) => a <= b,
        _ => candidate <= current,
    }
}

/// Cooperative per-document lock stored inside document metadata.
///
/// Release is compare-and-clear: only the holding worker can clear it, so a
/// slow worker cannot release a lock another worker took over after expiry.
pub struct LockManager {
    key: String,
    ttl: Duration,
}

impl LockManager {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            key: format!("{}_lock", DEFAULT_ENHANCEMENT_KEY),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Try to take the lock. Fails when an unexpired lock is held by a
    /// different worker.
    pub fn acquire_processing_lock(
        &self,
        metadata: &mut Metadata,
        doc_id: &str,
        worker_id: &str,
    ) -> bool {
        if let Some(Value::Object(lock)) = metadata.get(&self.key) {
            let holder = lock.get("worker_id").and_then(|v| v.as_str()).unwrap_or("");
            let locked_at = lock
                .get("locked_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));

            let expired = locked_at
                .map(|t| Utc::now() - t > self.ttl)
                .unwrap_or(true);

            if !expired && holder != worker_id {
                tracing::debug!(
                    "Lock on {} held by {}, not granted to {}",
                    doc_id,
                    holder,
                    worker_id
                );
                return false;
            }
        }

        let mut lock = Metadata::new();
        lock.insert("worker_id".into(), json!(worker_id));
        lock.insert("locked_at".into(), json!(Utc::now().to_rfc3339()));
        metadata.insert(self.key.clone(), Value::Object(lock));
        true
    }

    /// Clear the lock only when `worker_id` is the current holder.
    pub fn release_processing_lock(
        &self,
        metadata: &mut Metadata,
        doc_id: &str,
        worker_id: &str,
    ) -> bool {
        let holder = match metadata.get(&self.key) {
            Some(Value::Object(lock)) => lock
                .get("worker_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            _ => return false,
        };

        if holder != worker_id {
            tracing::debug!(
                "Release of lock on {} refused: held by {}, requested by {}",
                doc_id,
                holder,
                worker_id
            );
            return false;
        }

        metadata.remove(&self.key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Metadata {
        let mut m = Metadata::new();
        m.insert("judge_name".into(), json!("Jane Roe"));
        m
    }

    #[test]
    fn test_mark_then_check_roundtrip() {
        let enhancer = ProgressiveEnhancer::new("1.0");
        let original = Metadata::new();
        let marked = enhancer.mark_document_enhanced(&original, payload(), None);

        // Input untouched, output marked.
        assert!(original.is_empty());
        assert!(enhancer.check_if_already_enhanced(&marked));
        assert!(!enhancer.check_if_already_enhanced(&original));
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let enhancer = ProgressiveEnhancer::new("1.0");
        let first = enhancer.mark_document_enhanced(&Metadata::new(), payload(), None);
        let second = enhancer.mark_document_enhanced(&first, payload(), None);

        // One marker object, not two; payload identical.
        assert_eq!(first.len(), second.len());
        assert_eq!(
            first[DEFAULT_ENHANCEMENT_KEY]["enhancements"],
            second[DEFAULT_ENHANCEMENT_KEY]["enhancements"]
        );
    }

    #[test]
    fn test_version_bump_invalidates() {
        let v1 = ProgressiveEnhancer::new("1.0");
        let marked = v1.mark_document_enhanced(&Metadata::new(), payload(), None);

        let v1_1 = ProgressiveEnhancer::new("1.1");
        assert!(!v1_1.check_if_already_enhanced(&marked));

        let remarked = v1_1.mark_document_enhanced(&marked, payload(), None);
        assert!(v1_1.check_if_already_enhanced(&remarked));
        assert!(!ProgressiveEnhancer::new("1.2").check_if_already_enhanced(&remarked));
    }

    #[tokio::test]
    async fn test_batch_skips_enhanced_and_survives_errors() {
        let enhancer = ProgressiveEnhancer::new("1.0");

        let mut done = RawDocument::new("done");
        done.metadata = enhancer.mark_document_enhanced(&done.metadata, payload(), None);
        let fresh = RawDocument::new("fresh");
        let broken = RawDocument::new("broken");

        let outcome = enhancer
            .batch_enhance_documents(
                vec![done, fresh, broken],
                |doc| async move {
                    if doc.source_id == "broken" {
                        Err(crate::internal_error!("synthetic failure"))
                    } else {
                        Ok(Metadata::new())
                    }
                },
                true,
            )
            .await;

        assert_eq!(outcome.skipped, vec!["done".to_string()]);
        assert_eq!(outcome.enhanced.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].document_id, "broken");
    }

    #[test]
    fn test_checkpoint_roundtrip_and_monotonic_advance() {
        let mut checkpoint = Checkpoint::new("100", "opinions", "session-1", None);
        checkpoint.advance(
            "150",
            CheckpointCounters {
                checked: 50,
                enhanced: 40,
                skipped: 8,
                errors: 2,
            },
        );
        // A smaller ID never moves the checkpoint backwards.
        checkpoint.advance("120", CheckpointCounters::default());
        assert_eq!(checkpoint.last_processed_id, "150");
        assert_eq!(checkpoint.counters.enhanced, 40);

        let json = checkpoint.to_json().unwrap();
        let resumed = Checkpoint::resume(&json).unwrap();
        assert_eq!(resumed.last_processed_id, "150");
        assert_eq!(resumed.session_id, "session-1");
        assert_eq!(resumed.counters.checked, 50);
    }

    #[test]
    fn test_lock_compare_and_clear() {
        let locks = LockManager::new(30);
        let mut metadata = Metadata::new();

        assert!(locks.acquire_processing_lock(&mut metadata, "X1", "worker-a"));
        // B cannot take an unexpired lock held by A.
        assert!(!locks.acquire_processing_lock(&mut metadata, "X1", "worker-b"));
        // B's release does not clear A's lock.
        assert!(!locks.release_processing_lock(&mut metadata, "X1", "worker-b"));
        assert!(locks.acquire_processing_lock(&mut metadata, "X1", "worker-a"));
        // A's own release clears it.
        assert!(locks.release_processing_lock(&mut metadata, "X1", "worker-a"));
        assert!(locks.acquire_processing_lock(&mut metadata, "X1", "worker-b"));
    }
}
