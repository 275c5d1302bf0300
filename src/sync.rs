//! Vector store synchronizer.
//!
//! One pass reconciles the index with the catalog:
//!
//! ```text
//! catalog snapshot ─┐
//!                   ├─▶ to_add = catalog − index ──▶ load ▶ chunk ▶ embed ▶ upsert
//! indexed_hashes ───┘   to_remove = index − catalog ─▶ delete_by_hash
//! ```
//!
//! Both sets are processed in sorted hash order. A failure for one hash is
//! recorded in the [`SyncReport`] and the pass moves on; the hash is simply
//! still missing (or still present) next pass and gets retried then. Only
//! a failed catalog snapshot or hash query fails the pass as a whole.
//!
//! The index's hash set always comes from the index itself, never from a
//! local cache, so a pass is correct after crashes or manual edits.

use anyhow::{Context, Result};
use ragsync_core::chunk::split_text;
use ragsync_core::embedding::EmbeddingProvider;
use ragsync_core::error::EmbeddingError;
use ragsync_core::index::{chunk_id, IndexedChunk, VectorIndex};
use ragsync_core::resource::chunk_metadata;
use ragsync_core::stem::TextNormalizer;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogSnapshot;
use crate::config::Config;
use crate::persist::PersistenceService;
use crate::retry::{run_with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Load,
    Embed,
    Upsert,
    Delete,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStage::Load => "load",
            SyncStage::Embed => "embed",
            SyncStage::Upsert => "upsert",
            SyncStage::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub hash: String,
    pub stage: SyncStage,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<SyncFailure>,
    /// Chunks written for the added hashes.
    pub chunks_added: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// The work a pass would do, without doing it.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

/// Compute the add/remove sets. Both come out sorted.
pub fn diff(catalog: &BTreeSet<String>, indexed: &BTreeSet<String>) -> SyncPlan {
    SyncPlan {
        to_add: catalog.difference(indexed).cloned().collect(),
        to_remove: indexed.difference(catalog).cloned().collect(),
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub stemming: bool,
    pub batch_size: usize,
    pub embed_retry: RetryPolicy,
    pub index_retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        let base_delay = Duration::from_millis(config.embedding.backoff_base_ms);
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            stemming: config.chunking.stemming,
            batch_size: config.embedding.batch_size.max(1),
            embed_retry: RetryPolicy {
                max_retries: config.embedding.max_retries,
                base_delay,
                timeout: Duration::from_secs(config.embedding.timeout_secs),
            },
            index_retry: RetryPolicy {
                max_retries: config.embedding.max_retries,
                base_delay,
                timeout: Duration::from_secs(config.sync.index_timeout_secs),
            },
        }
    }
}

pub struct Synchronizer {
    persistence: Arc<PersistenceService>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: SyncSettings,
    normalizer: TextNormalizer,
}

impl Synchronizer {
    pub fn new(
        persistence: Arc<PersistenceService>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: SyncSettings,
    ) -> Self {
        let normalizer = TextNormalizer::new(settings.stemming);
        Self {
            persistence,
            index,
            embedder,
            settings,
            normalizer,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    async fn snapshot(&self) -> Result<CatalogSnapshot> {
        let catalog = self.persistence.catalog().clone();
        let snapshot = tokio::task::spawn_blocking(move || catalog.snapshot())
            .await?
            .context("Failed to read catalog")?;
        Ok(snapshot)
    }

    /// Diff the current catalog against the index.
    pub async fn plan(&self) -> Result<SyncPlan> {
        let snapshot = self.snapshot().await?;
        let indexed = self
            .index
            .indexed_hashes()
            .await
            .context("Failed to query indexed hashes")?;
        Ok(diff(&snapshot.hashes(), &indexed))
    }

    /// Run one synchronization pass.
    pub async fn sync(&self) -> Result<SyncReport> {
        let snapshot = Arc::new(self.snapshot().await?);
        let indexed = self
            .index
            .indexed_hashes()
            .await
            .context("Failed to query indexed hashes")?;
        let plan = diff(&snapshot.hashes(), &indexed);

        tracing::info!(
            catalog = snapshot.len(),
            indexed = indexed.len(),
            to_add = plan.to_add.len(),
            to_remove = plan.to_remove.len(),
            "sync pass started"
        );

        let mut report = SyncReport::default();

        for hash in &plan.to_remove {
            let result = run_with_retry(&self.settings.index_retry, "delete", || {
                self.index.delete_by_hash(hash)
            })
            .await;
            match result {
                Ok(deleted) => {
                    tracing::debug!(hash = %hash, chunks = deleted, "removed from index");
                    report.removed.push(hash.clone());
                }
                Err(e) => record(&mut report, hash, SyncStage::Delete, format!("{:#}", e)),
            }
        }

        for hash in &plan.to_add {
            match self.index_resource(&snapshot, hash).await {
                Ok(chunks) => {
                    tracing::debug!(hash = %hash, chunks, "added to index");
                    report.chunks_added += chunks;
                    report.added.push(hash.clone());
                }
                Err((stage, message)) => record(&mut report, hash, stage, message),
            }
        }

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            chunks = report.chunks_added,
            "sync pass complete"
        );
        Ok(report)
    }

    /// Load, chunk, embed, and upsert one resource. Returns the chunk count.
    async fn index_resource(
        &self,
        snapshot: &Arc<CatalogSnapshot>,
        hash: &str,
    ) -> Result<usize, (SyncStage, String)> {
        let persistence = self.persistence.clone();
        let snapshot = snapshot.clone();
        let key = hash.to_string();
        let stored = tokio::task::spawn_blocking(move || persistence.load(&snapshot, &key))
            .await
            .map_err(|e| (SyncStage::Load, e.to_string()))?
            .map_err(|e| (SyncStage::Load, e.to_string()))?;

        let pieces = split_text(
            &stored.index_text(),
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        );
        if pieces.is_empty() {
            return Err((SyncStage::Load, "no indexable text".to_string()));
        }

        let inputs: Vec<String> = pieces
            .iter()
            .map(|p| self.normalizer.for_embedding(&p.text))
            .collect();
        let vectors = self
            .embed_all(&inputs)
            .await
            .map_err(|e| (SyncStage::Embed, e.to_string()))?;

        let metadata = chunk_metadata(
            hash,
            &stored.filename,
            stored.metadata.as_ref(),
            self.embedder.model_name(),
        );
        let chunks: Vec<IndexedChunk> = pieces
            .into_iter()
            .zip(vectors)
            .map(|(piece, vector)| IndexedChunk {
                id: chunk_id(hash, piece.index),
                hash: hash.to_string(),
                chunk_index: piece.index as i64,
                text: piece.text,
                vector,
                metadata: metadata.clone(),
            })
            .collect();

        let upserted = run_with_retry(&self.settings.index_retry, "upsert", || {
            self.index.upsert(&chunks)
        })
        .await;
        if let Err(e) = upserted {
            // Clear whatever part of the upsert landed so the hash stays
            // absent from the index and is retried next pass.
            if let Err(cleanup) = self.index.delete_by_hash(hash).await {
                tracing::warn!(hash, error = %cleanup, "cleanup after failed upsert failed");
            }
            return Err((SyncStage::Upsert, format!("{:#}", e)));
        }

        Ok(chunks.len())
    }

    async fn embed_all(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.settings.batch_size) {
            let embedded = run_with_retry(&self.settings.embed_retry, "embed", || {
                self.embedder.embed(batch)
            })
            .await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::Permanent(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

fn record(report: &mut SyncReport, hash: &str, stage: SyncStage, error: String) {
    tracing::warn!(hash, stage = %stage, error = %error, "sync failed for resource");
    report.failed.push(SyncFailure {
        hash: hash.to_string(),
        stage,
        error,
    });
}
