//! # Storage Management Module
//!
//! ## Purpose
//! Durable persistence of enriched document records with merge-on-upsert
//! semantics: existing fields are never clobbered, byte-identical content is
//! never rewritten, and a content-hash tree makes duplicate inserts
//! observable instead of silent.
//!
//! ## Input/Output Specification
//! - **Input**: Enriched `DocumentRecord`s, checkpoints
//! - **Output**: Upsert outcomes (inserted/updated/unchanged/duplicate)
//! - **Storage**: Sled embedded database, one tree per concern
//!
//! ## Key Features
//! - Upsert keyed by external source ID
//! - Fingerprint comparison skips writes for unchanged content
//! - Content-hash tree claimed first-writer-wins, the unique-constraint
//!   analogue for cross-identity duplicates
//! - Gzip compression of record values

use crate::dedup::content_hash;
use crate::enhancement::Checkpoint;
use crate::errors::{EnrichmentError, Result};
use crate::{merge, DocumentRecord, PDF_PENDING_PREFIX};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of one upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row written
    Inserted,
    /// Existing row merged and updated
    Updated,
    /// Enhanced content byte-identical to the stored row; nothing written
    Unchanged,
    /// Another row already holds this content hash
    DuplicateContent { existing_id: String },
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_documents: usize,
    pub database_size_bytes: u64,
}

use crate::config::StorageConfig;

/// Main storage manager
pub struct StorageManager {
    config: StorageConfig,
    db: Arc<sled::Db>,
    documents_tree: Arc<sled::Tree>,
    hashes_tree: Arc<sled::Tree>,
    checkpoints_tree: Arc<sled::Tree>,
    stats: Arc<RwLock<StorageStats>>,
}

impl StorageManager {
    /// Create new storage manager
    pub async fn new(config: StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = sled::open(&config.db_path).map_err(|e| {
            EnrichmentError::DatabaseConnectionFailed {
                db_path: config.db_path.to_string_lossy().to_string(),
                reason: e.to_string(),
            }
        })?;

        let documents_tree = db.open_tree("documents")?;
        let hashes_tree = db.open_tree("content_hashes")?;
        let checkpoints_tree = db.open_tree("checkpoints")?;

        let stats = Arc::new(RwLock::new(StorageStats {
            total_documents: documents_tree.len(),
            database_size_bytes: 0,
        }));

        let storage = Self {
            config,
            db: Arc::new(db),
            documents_tree: Arc::new(documents_tree),
            hashes_tree: Arc::new(hashes_tree),
            checkpoints_tree: Arc::new(checkpoints_tree),
            stats,
        };

        tracing::info!(
            "Storage manager initialized with {} documents",
            storage.stats.read().await.total_documents
        );

        Ok(storage)
    }

    /// Upsert a record keyed by its external source ID.
    ///
    /// Inserts claim the content hash first-writer-wins; an update whose
    /// fingerprint matches the stored row writes nothing at all.
    pub async fn upsert_document(&self, record: &DocumentRecord) -> Result<UpsertOutcome> {
        let key = record.source_id.as_bytes();

        match self.documents_tree.get(key)? {
            Some(existing_bytes) => {
                let existing = self.decode_record(&existing_bytes)?;

                if existing.content_hash == record.content_hash {
                    tracing::debug!(
                        "Document {} unchanged (fingerprint match), skipping write",
                        record.source_id
                    );
                    return Ok(UpsertOutcome::Unchanged);
                }

                // Merge rather than clobber: existing non-null metadata
                // survives, incoming additions land.
                let mut merged_metadata = existing.metadata.clone();
                merge::merge_preserving(&mut merged_metadata, record.metadata.clone());

                let content = if record.content.trim().is_empty() {
                    existing.content.clone()
                } else {
                    record.content.clone()
                };

                if has_real_content(&content) {
                    if let Some(existing_id) = self.claim_hash(&content, &record.source_id)? {
                        return Ok(UpsertOutcome::DuplicateContent { existing_id });
                    }
                }
                if has_real_content(&existing.content) && existing.content != content {
                    self.hashes_tree.remove(content_hash(&existing.content))?;
                }

                let updated = DocumentRecord {
                    source_id: existing.source_id.clone(),
                    doc_type: record.doc_type.clone(),
                    content,
                    metadata: merged_metadata,
                    content_hash: record.content_hash.clone(),
                    created_at: existing.created_at,
                    updated_at: Utc::now(),
                };

                self.documents_tree
                    .insert(key, self.encode_record(&updated)?)?;
                tracing::debug!("Updated document {}", record.source_id);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                if has_real_content(&record.content) {
                    if let Some(existing_id) = self.claim_hash(&record.content, &record.source_id)?
                    {
                        tracing::debug!(
                            "Document {} duplicates stored content of {}",
                            record.source_id,
                            existing_id
                        );
                        return Ok(UpsertOutcome::DuplicateContent { existing_id });
                    }
                }

                self.documents_tree
                    .insert(key, self.encode_record(record)?)?;

                let mut stats = self.stats.write().await;
                stats.total_documents = self.documents_tree.len();

                tracing::debug!("Inserted document {}", record.source_id);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Claim a content hash for `source_id`. Returns the holder's ID when a
    /// different document already owns the hash.
    fn claim_hash(&self, content: &str, source_id: &str) -> Result<Option<String>> {
        let hash = content_hash(content);
        let claim = self.hashes_tree.compare_and_swap(
            hash.as_bytes(),
            None as Option<&[u8]>,
            Some(source_id.as_bytes()),
        )?;

        match claim {
            Ok(()) => Ok(None),
            Err(cas_error) => {
                let holder = cas_error
                    .current
                    .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                    .unwrap_or_default();
                if holder == source_id {
                    Ok(None)
                } else {
                    Ok(Some(holder))
                }
            }
        }
    }

    /// Retrieve a record by source ID
    pub async fn get_document(&self, source_id: &str) -> Result<Option<DocumentRecord>> {
        match self.documents_tree.get(source_id.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check if a record exists
    pub async fn document_exists(&self, source_id: &str) -> Result<bool> {
        Ok(self.documents_tree.contains_key(source_id.as_bytes())?)
    }

    /// All stored records, for dedup-index reloads
    pub async fn all_records(&self) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();
        for item in self.documents_tree.iter() {
            let (_, bytes) = item?;
            records.push(self.decode_record(&bytes)?);
        }
        Ok(records)
    }

    /// Number of stored documents
    pub async fn document_count(&self) -> usize {
        self.documents_tree.len()
    }

    /// Persist a checkpoint keyed by its collection name
    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let value = serde_json::to_vec(checkpoint)?;
        self.checkpoints_tree
            .insert(checkpoint.collection.as_bytes(), value)?;
        Ok(())
    }

    /// Load the checkpoint for a collection, if any
    pub async fn load_checkpoint(&self, collection: &str) -> Result<Option<Checkpoint>> {
        match self.checkpoints_tree.get(collection.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all trees. This is the batch commit point: failure here aborts
    /// the batch.
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| EnrichmentError::TransactionFailed {
                details: format!("flush failed: {}", e),
            })?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let test_key = b"__health_check";
        self.documents_tree.insert(test_key, b"ok")?;
        let read_back = self.documents_tree.get(test_key)?;
        self.documents_tree.remove(test_key)?;

        if read_back.is_none() {
            return Err(EnrichmentError::DatabaseConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: "health check value not found".to_string(),
            });
        }
        Ok(())
    }

    /// Get storage statistics
    pub async fn get_stats(&self) -> Result<StorageStats> {
        let mut stats = self.stats.write().await;
        stats.total_documents = self.documents_tree.len();
        stats.database_size_bytes = self.db.size_on_disk()?;
        Ok(stats.clone())
    }

    fn encode_record(&self, record: &DocumentRecord) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(record)?;
        if self.config.enable_compression {
            compress(&bytes)
        } else {
            Ok(bytes)
        }
    }

    fn decode_record(&self, bytes: &[u8]) -> Result<DocumentRecord> {
        if self.config.enable_compression {
            let decompressed = decompress(bytes)?;
            Ok(bincode::deserialize(&decompressed)?)
        } else {
            Ok(bincode::deserialize(bytes)?)
        }
    }
}

fn has_real_content(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.is_empty() && !trimmed.starts_with(PDF_PENDING_PREFIX)
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
