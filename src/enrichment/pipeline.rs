//! # Enrichment Pipeline
//!
//! ## Purpose
//! Orchestrates the complete per-document enrichment workflow: duplicate
//! screening, content recovery, field resolution, citation extraction,
//! structural analysis, metadata assembly, validation, storage, and optional
//! search-sink forwarding.
//!
//! ## Input/Output Specification
//! - **Input**: Batches of raw documents from a document source
//! - **Output**: Upserted records plus a structured batch result with
//!   explicit success flag, counts, and attributable errors
//! - **Workflow**: Dedup → Resolve → Extract → Assemble → Validate → Store → Forward
//!
//! ## Key Features
//! - Bounded concurrent enrichment with a fixed task pool
//! - Per-document failures recorded, never fatal; storage-level failures
//!   abort the batch
//! - Monotonic checkpoint advancement for resumable runs

use super::validation::RecordValidator;
use super::{
    assemble_comprehensive_metadata, detect_structure, verify_batch, BatchVerification,
    EnrichmentSummary,
};
use crate::citations::CitationNormalizer;
use crate::config::EnrichmentConfig;
use crate::dedup::{fingerprint, DedupIndex};
use crate::enhancement::{Checkpoint, CheckpointCounters, LockManager, ProgressiveEnhancer};
use crate::errors::Result;
use crate::extract::TextExtractor;
use crate::fields::{detect_origin, DocumentOrigin, FieldResolver};
use crate::sink::{forward_best_effort, SearchSink, SinkDocument};
use crate::sources::{DocumentSource, FetchQuery};
use crate::storage::{StorageManager, UpsertOutcome};
use crate::{DocumentRecord, Metadata, RawDocument};
use crate::utils::Timer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};

/// Pipeline execution statistics, always returned in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Documents that entered the batch
    pub documents_processed: usize,
    /// Records inserted or updated
    pub stored: usize,
    /// Duplicates screened out (dedup index or storage hash)
    pub duplicates_skipped: usize,
    /// Documents whose marker already matched the current version
    pub already_enhanced_skipped: usize,
    /// Stored rows untouched because content was byte-identical
    pub unchanged_skipped: usize,
    /// Documents under another worker's unexpired lock
    pub locked_skipped: usize,
    /// Stored documents still awaiting text
    pub pending_content: usize,
    /// Records that failed validation (still stored)
    pub validation_failures: usize,
    /// Per-document processing errors
    pub errors: usize,
    /// Documents accepted by the search sink
    pub forwarded_to_sink: usize,
    /// Documents per second
    pub processing_rate: f64,
    pub start_time: Option<chrono::DateTime<Utc>>,
    pub end_time: Option<chrono::DateTime<Utc>>,
}

/// Why a document was skipped rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    AlreadyEnhanced,
    UnchangedContent,
    LockedByOtherWorker,
}

/// The explicit per-document outcome the batch loop pattern-matches on.
#[derive(Debug)]
pub enum DocumentOutcome {
    Enriched {
        record: DocumentRecord,
        summary: EnrichmentSummary,
        validation_passed: bool,
    },
    Skipped {
        source_id: String,
        reason: SkipReason,
    },
    Failed {
        source_id: String,
        stage: &'static str,
        message: String,
    },
}

/// Structured result of one batch run.
#[derive(Debug)]
pub struct BatchResult {
    /// True when every document was stored or legitimately skipped
    pub success: bool,
    pub stats: PipelineStats,
    pub verification: BatchVerification,
    /// Human-readable, attributable per-document errors
    pub errors: Vec<String>,
    pub checkpoint: Checkpoint,
}

/// Main enrichment pipeline.
pub struct EnrichmentPipeline {
    config: EnrichmentConfig,
    storage: Arc<StorageManager>,
    resolver: FieldResolver,
    citations: CitationNormalizer,
    dedup: Arc<DedupIndex>,
    enhancer: ProgressiveEnhancer,
    locks: LockManager,
    validator: RecordValidator,
    sink: Option<Arc<dyn SearchSink>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    semaphore: Arc<Semaphore>,
    stats: Arc<RwLock<PipelineStats>>,
    session_id: String,
}

impl EnrichmentPipeline {
    /// Create a new pipeline. The dedup index is warmed from storage so
    /// duplicate knowledge survives process restarts.
    pub async fn new(config: EnrichmentConfig, storage: Arc<StorageManager>) -> Result<Self> {
        let dedup = Arc::new(DedupIndex::new());
        dedup.reload_from_storage(&storage).await?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_enrichments));
        let enhancer = ProgressiveEnhancer::new(config.enhancement_version.clone());
        let locks = LockManager::new(config.lock_ttl_minutes);

        Ok(Self {
            config,
            storage,
            resolver: FieldResolver::new(),
            citations: CitationNormalizer::new(),
            dedup,
            enhancer,
            locks,
            validator: RecordValidator::new(),
            sink: None,
            extractor: None,
            semaphore,
            stats: Arc::new(RwLock::new(PipelineStats::default())),
            session_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Attach a search sink for best-effort forwarding.
    pub fn with_sink(mut self, sink: Arc<dyn SearchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a PDF/OCR extraction service for pending documents.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Fetch from a source and run one batch, resuming from and saving the
    /// collection's persisted checkpoint.
    pub async fn run_from_source(
        &self,
        source: &dyn DocumentSource,
        query: &FetchQuery,
    ) -> Result<BatchResult> {
        let documents = source.fetch(query).await?;
        tracing::info!(
            "Fetched {} documents from source '{}'",
            documents.len(),
            source.name()
        );

        let resume = self.storage.load_checkpoint(&self.config.collection).await?;
        let result = self.run_batch_with_checkpoint(documents, resume).await?;
        self.storage.save_checkpoint(&result.checkpoint).await?;
        Ok(result)
    }

    /// Run one batch from the beginning.
    pub async fn run_batch(&self, documents: Vec<RawDocument>) -> Result<BatchResult> {
        self.run_batch_with_checkpoint(documents, None).await
    }

    /// Run one batch, skipping documents a prior checkpoint already covered.
    pub async fn run_batch_with_checkpoint(
        &self,
        documents: Vec<RawDocument>,
        resume: Option<Checkpoint>,
    ) -> Result<BatchResult> {
        let batch_timer = Timer::new("enrichment_batch");
        {
            let mut stats = self.stats.write().await;
            *stats = PipelineStats::default();
            stats.start_time = Some(Utc::now());
        }

        let checkpoint = match resume {
            Some(checkpoint) => {
                tracing::info!(
                    "Resuming batch after document {} (session {})",
                    checkpoint.last_processed_id,
                    checkpoint.session_id
                );
                checkpoint
            }
            None => Checkpoint::new("", self.config.collection.clone(), self.session_id.clone(), None),
        };

        let documents: Vec<RawDocument> = documents
            .into_iter()
            .filter(|doc| {
                if checkpoint.covers(&doc.source_id) {
                    tracing::debug!("Document {} covered by checkpoint, skipping", doc.source_id);
                    false
                } else {
                    true
                }
            })
            .collect();

        tracing::info!(
            "Processing batch of {} documents ({} concurrent)",
            documents.len(),
            self.config.max_concurrent_enrichments
        );

        let checkpoint = Arc::new(Mutex::new(checkpoint));
        let tasks = documents.into_iter().map(|doc| {
            let checkpoint = checkpoint.clone();
            async move {
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .expect("enrichment semaphore closed");

                let source_id = doc.source_id.clone();
                let outcome = self.enrich_document(doc).await;

                if let Ok(outcome) = &outcome {
                    let counters = self.record_outcome(outcome).await;
                    let mut checkpoint = checkpoint.lock().await;
                    checkpoint.advance(&source_id, counters);
                }
                outcome
            }
        });

        let outcomes = futures::future::join_all(tasks).await;

        let mut enriched: Vec<(DocumentRecord, EnrichmentSummary)> = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(DocumentOutcome::Enriched {
                    record, summary, ..
                }) => enriched.push((record, summary)),
                Ok(DocumentOutcome::Skipped { .. }) => {}
                Ok(DocumentOutcome::Failed {
                    source_id,
                    stage,
                    message,
                }) => {
                    errors.push(format!(
                        "document {} failed at stage '{}': {}",
                        source_id, stage, message
                    ));
                }
                // A fatal error (lost database, failed transaction) aborts
                // the whole batch.
                Err(fatal) => return Err(fatal),
            }
        }

        // Batch commit point.
        self.storage.flush().await?;

        if let Some(sink) = &self.sink {
            if self.config.forward_to_sink {
                let sink_docs: Vec<SinkDocument> = enriched
                    .iter()
                    .filter(|(record, _)| record.metadata.get("has_content") == Some(&json!(true)))
                    .map(|(record, _)| SinkDocument {
                        content: record.content.clone(),
                        meta: record.metadata.clone(),
                    })
                    .collect();
                let accepted = forward_best_effort(sink.as_ref(), &sink_docs).await;
                self.stats.write().await.forwarded_to_sink = accepted;
            }
        }

        let summaries: Vec<EnrichmentSummary> =
            enriched.iter().map(|(_, summary)| summary.clone()).collect();
        let verification = verify_batch(&summaries);

        let stats = {
            let mut stats = self.stats.write().await;
            stats.end_time = Some(Utc::now());
            let elapsed = batch_timer.elapsed_secs();
            if elapsed > 0.0 {
                stats.processing_rate = stats.documents_processed as f64 / elapsed;
            }
            batch_timer.stop();
            stats.clone()
        };

        tracing::info!(
            "Batch completed: {} processed, {} stored, {} duplicates, {} errors \
             (completeness {:.1}%, quality {:.1}%)",
            stats.documents_processed,
            stats.stored,
            stats.duplicates_skipped,
            stats.errors,
            verification.completeness_score,
            verification.quality_score
        );

        let checkpoint = checkpoint.lock().await.clone();

        Ok(BatchResult {
            success: errors.is_empty(),
            stats,
            verification,
            errors,
            checkpoint,
        })
    }

    /// Enrich one document. `Err` is reserved for fatal conditions; every
    /// expected failure mode comes back as a `DocumentOutcome`.
    async fn enrich_document(&self, mut doc: RawDocument) -> Result<DocumentOutcome> {
        self.stats.write().await.documents_processed += 1;

        if self.dedup.is_duplicate(&doc) {
            tracing::debug!("Document {} is a duplicate, skipping", doc.source_id);
            return Ok(DocumentOutcome::Skipped {
                source_id: doc.source_id,
                reason: SkipReason::Duplicate,
            });
        }

        // Content recovery for pending PDFs; failure keeps the placeholder.
        if !doc.has_content() {
            if let (Some(extractor), Some(url)) = (
                &self.extractor,
                doc.pending_pdf_url().map(str::to_string),
            ) {
                if let Some(text) = extractor.extract_text(&url).await {
                    tracing::debug!("Recovered {} chars for document {}", text.len(), doc.source_id);
                    doc.content = Some(text);
                }
            }
        }

        if self.config.skip_enhanced && self.enhancer.check_if_already_enhanced(&doc.metadata) {
            return Ok(DocumentOutcome::Skipped {
                source_id: doc.source_id,
                reason: SkipReason::AlreadyEnhanced,
            });
        }

        // Honor an unexpired lock another worker left in the fetched
        // metadata; hold our own for the duration of the enrichment.
        if !self
            .locks
            .acquire_processing_lock(&mut doc.metadata, &doc.source_id, &self.session_id)
        {
            return Ok(DocumentOutcome::Skipped {
                source_id: doc.source_id,
                reason: SkipReason::LockedByOtherWorker,
            });
        }

        let origin = detect_origin(&doc.metadata);
        let judge = self.resolver.resolve_judge(&doc.metadata, Some(origin));
        let court = self.resolver.resolve_court(&doc.metadata);

        let text = if doc.has_content() {
            doc.content.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let citations = self.citations.extract(&text);
        let structure = detect_structure(&text);

        // Clear our lock before assembly so the record never persists it.
        self.locks
            .release_processing_lock(&mut doc.metadata, &doc.source_id, &self.session_id);

        let assembled = assemble_comprehensive_metadata(&doc, &judge, &court, &citations, &structure);

        let mut payload = Metadata::new();
        payload.insert("judge_resolved".into(), json!(judge.primary_judge.is_some()));
        payload.insert("court_resolved".into(), json!(court.court_id.is_some()));
        payload.insert("citation_count".into(), json!(citations.len()));
        payload.insert("structural_element_count".into(), json!(structure.len()));
        let marked = self.enhancer.mark_document_enhanced(&assembled, payload, None);

        let content = doc.content.clone().unwrap_or_default();
        let record = DocumentRecord {
            source_id: doc.source_id.clone(),
            doc_type: doc_type_for(origin).to_string(),
            content_hash: fingerprint(&doc.source_id, doc.case_number(), &content),
            content,
            metadata: marked,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        // Validation failures are recorded, never a storage gate.
        let validation = self.validator.validate(&record);
        if !validation.passed {
            tracing::warn!(
                "Document {} failed validation: {} issue(s)",
                record.source_id,
                validation.issues.len()
            );
            self.stats.write().await.validation_failures += 1;
        }

        let summary = EnrichmentSummary::new(&judge, &court, &citations, &structure, doc.has_content());

        match self.storage.upsert_document(&record).await {
            Ok(UpsertOutcome::Inserted) | Ok(UpsertOutcome::Updated) => {
                self.dedup.mark_processed(&doc);
                if !doc.has_content() {
                    self.stats.write().await.pending_content += 1;
                }
                Ok(DocumentOutcome::Enriched {
                    record,
                    summary,
                    validation_passed: validation.passed,
                })
            }
            Ok(UpsertOutcome::Unchanged) => {
                self.dedup.mark_processed(&doc);
                Ok(DocumentOutcome::Skipped {
                    source_id: doc.source_id,
                    reason: SkipReason::UnchangedContent,
                })
            }
            Ok(UpsertOutcome::DuplicateContent { existing_id }) => {
                tracing::debug!(
                    "Document {} duplicates stored content of {}",
                    doc.source_id,
                    existing_id
                );
                Ok(DocumentOutcome::Skipped {
                    source_id: doc.source_id,
                    reason: SkipReason::Duplicate,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!("Failed to store document {}: {}", doc.source_id, e);
                Ok(DocumentOutcome::Failed {
                    source_id: doc.source_id,
                    stage: "storage",
                    message: e.to_string(),
                })
            }
        }
    }

    /// Fold one outcome into the running stats, returning a counter
    /// snapshot for the checkpoint.
    async fn record_outcome(&self, outcome: &DocumentOutcome) -> CheckpointCounters {
        let mut stats = self.stats.write().await;
        match outcome {
            DocumentOutcome::Enriched { .. } => stats.stored += 1,
            DocumentOutcome::Skipped { reason, .. } => match reason {
                SkipReason::Duplicate => stats.duplicates_skipped += 1,
                SkipReason::AlreadyEnhanced => stats.already_enhanced_skipped += 1,
                SkipReason::UnchangedContent => stats.unchanged_skipped += 1,
                SkipReason::LockedByOtherWorker => stats.locked_skipped += 1,
            },
            DocumentOutcome::Failed { .. } => stats.errors += 1,
        }

        CheckpointCounters {
            checked: stats.documents_processed,
            enhanced: stats.stored,
            skipped: stats.duplicates_skipped
                + stats.already_enhanced_skipped
                + stats.unchanged_skipped,
            errors: stats.errors,
        }
    }

    /// Current pipeline statistics.
    pub async fn get_stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn doc_type_for(origin: DocumentOrigin) -> &'static str {
    match origin {
        DocumentOrigin::Docket => "docket",
        DocumentOrigin::Opinion => "opinion",
        DocumentOrigin::Cluster => "cluster",
        DocumentOrigin::SearchResult | DocumentOrigin::Unknown => "document",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::enhancement::DEFAULT_ENHANCEMENT_KEY;
    use serde_json::json;

    async fn test_pipeline() -> (EnrichmentPipeline, Arc<StorageManager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            StorageManager::new(StorageConfig {
                db_path: dir.path().join("pipeline.db"),
                enable_compression: false,
            })
            .await
            .unwrap(),
        );
        let config = EnrichmentConfig {
            batch_size: 100,
            max_concurrent_enrichments: 4,
            enhancement_version: "1.0".to_string(),
            skip_enhanced: true,
            collection: "court_documents".to_string(),
            lock_ttl_minutes: 30,
            forward_to_sink: false,
        };
        let pipeline = EnrichmentPipeline::new(config, storage.clone()).await.unwrap();
        (pipeline, storage, dir)
    }

    #[tokio::test]
    async fn test_end_to_end_judge_citation_and_marker() {
        let (pipeline, storage, _dir) = test_pipeline().await;

        let mut doc = RawDocument::new("X1");
        doc.content = Some(
            "Relying on Brown v. Board of Education, 347 U.S. 483 (1954), the motion is granted."
                .to_string(),
        );
        doc.metadata.insert("assigned_to".into(), json!("Jane Roe"));

        let result = pipeline.run_batch(vec![doc]).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stats.stored, 1);

        let record = storage.get_document("X1").await.unwrap().unwrap();
        assert_eq!(record.metadata["judge_name"], json!("Jane Roe"));
        assert_eq!(
            record.metadata["judge_source_field"],
            json!("document.assigned_to")
        );
        let citations = record.metadata["citations"].as_array().unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0]["normalized_reporter"], json!("U.S."));
        assert_eq!(
            record.metadata[DEFAULT_ENHANCEMENT_KEY]["enhancement_complete"],
            json!(true)
        );
        assert_eq!(record.doc_type, "docket");
    }

    #[tokio::test]
    async fn test_end_to_end_duplicate_across_batches() {
        let (pipeline, storage, _dir) = test_pipeline().await;

        let mut doc = RawDocument::new("X2");
        doc.content = Some("The petition for certiorari is denied.".to_string());

        let first = pipeline.run_batch(vec![doc.clone()]).await.unwrap();
        assert_eq!(first.stats.stored, 1);
        assert_eq!(first.stats.duplicates_skipped, 0);

        let second = pipeline.run_batch(vec![doc]).await.unwrap();
        assert!(second.success);
        assert_eq!(second.stats.stored, 0);
        assert_eq!(second.stats.duplicates_skipped, 1);
        assert_eq!(storage.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_empty_document_still_stored() {
        let (pipeline, storage, _dir) = test_pipeline().await;

        let doc = RawDocument::new("X3");
        let result = pipeline.run_batch(vec![doc]).await.unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.stats.stored, 1);
        assert_eq!(result.stats.pending_content, 1);

        let record = storage.get_document("X3").await.unwrap().unwrap();
        assert_eq!(record.metadata["has_content"], json!(false));
        assert!(!record.metadata.contains_key("judge_name"));
        assert_eq!(record.metadata["citations"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_dedup_survives_pipeline_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage_config = StorageConfig {
            db_path: dir.path().join("restart.db"),
            enable_compression: false,
        };
        let config = EnrichmentConfig {
            batch_size: 100,
            max_concurrent_enrichments: 2,
            enhancement_version: "1.0".to_string(),
            skip_enhanced: true,
            collection: "court_documents".to_string(),
            lock_ttl_minutes: 30,
            forward_to_sink: false,
        };

        let mut doc = RawDocument::new("R1");
        doc.content = Some("Judgment affirmed.".to_string());

        {
            let storage = Arc::new(StorageManager::new(storage_config.clone()).await.unwrap());
            let pipeline = EnrichmentPipeline::new(config.clone(), storage).await.unwrap();
            pipeline.run_batch(vec![doc.clone()]).await.unwrap();
        }

        // A fresh pipeline over the same database reloads the dedup index.
        let storage = Arc::new(StorageManager::new(storage_config).await.unwrap());
        let pipeline = EnrichmentPipeline::new(config, storage.clone()).await.unwrap();
        let result = pipeline.run_batch(vec![doc]).await.unwrap();

        assert_eq!(result.stats.duplicates_skipped, 1);
        assert_eq!(storage.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_foreign_lock_skips_document() {
        let (pipeline, storage, _dir) = test_pipeline().await;

        let mut doc = RawDocument::new("L1");
        doc.content = Some("Motion denied.".to_string());
        doc.metadata.insert(
            format!("{}_lock", DEFAULT_ENHANCEMENT_KEY),
            json!({
                "worker_id": "other-worker",
                "locked_at": Utc::now().to_rfc3339(),
            }),
        );

        let result = pipeline.run_batch(vec![doc]).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stats.locked_skipped, 1);
        assert_eq!(storage.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_checkpoint_skips_covered_documents() {
        let (pipeline, _storage, _dir) = test_pipeline().await;

        let docs: Vec<RawDocument> = (1..=4)
            .map(|n| {
                let mut d = RawDocument::new(n.to_string());
                d.content = Some(format!("Order number {} entered.", n));
                d
            })
            .collect();

        let resume = Checkpoint::new("2", "court_documents", "prior-session", None);
        let result = pipeline
            .run_batch_with_checkpoint(docs, Some(resume))
            .await
            .unwrap();

        // Documents 1 and 2 are covered; 3 and 4 run.
        assert_eq!(result.stats.documents_processed, 2);
        assert_eq!(result.stats.stored, 2);
        assert_eq!(result.checkpoint.last_processed_id, "4");
    }
}
