//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is everything the synchronizer and retriever
//! need from the external system of record for "what is currently
//! searchable". Each call is assumed atomic on its own; nothing here
//! coordinates across calls.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub use memory::InMemoryIndex;

/// One chunk of a resource as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedChunk {
    /// `"{hash}-{chunk_index}"`, see [`chunk_id`].
    pub id: String,
    /// Parent resource hash.
    pub hash: String,
    pub chunk_index: i64,
    pub text: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Flat string metadata: `hash`, `filename`, `display_name`,
    /// `embedding_model`, and the resource's extras.
    pub metadata: BTreeMap<String, String>,
}

impl IndexedChunk {
    pub fn display_name(&self) -> Option<&str> {
        self.metadata.get("display_name").map(String::as_str)
    }

    /// Source link of the parent resource, if its collector recorded one.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").map(String::as_str)
    }
}

/// Deterministic chunk id, so re-upserting a resource replaces rather
/// than duplicates its chunks.
pub fn chunk_id(hash: &str, chunk_index: usize) -> String {
    format!("{}-{}", hash, chunk_index)
}

/// Abstract vector index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace chunks by id |
/// | [`delete_by_hash`](VectorIndex::delete_by_hash) | Remove every chunk of a resource |
/// | [`indexed_hashes`](VectorIndex::indexed_hashes) | Parent hashes currently present |
/// | [`load_chunks`](VectorIndex::load_chunks) | All chunks, in insertion order |
/// | [`chunk_count`](VectorIndex::chunk_count) | Number of stored chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace chunks. A replaced chunk keeps its original
    /// insertion position.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Delete every chunk tagged with `hash`, returning how many were removed.
    async fn delete_by_hash(&self, hash: &str) -> Result<u64>;

    /// The set of parent hashes represented in the index, read from the
    /// index's own metadata.
    async fn indexed_hashes(&self) -> Result<BTreeSet<String>>;

    /// All chunks with their vectors, ordered by first insertion.
    async fn load_chunks(&self) -> Result<Vec<IndexedChunk>>;

    async fn chunk_count(&self) -> Result<u64>;
}
