//! In-memory [`VectorIndex`] for tests and embedding into other processes.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`, so insertion order
//! is simply vector order.

use std::collections::BTreeSet;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{IndexedChunk, VectorIndex};

pub struct InMemoryIndex {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for chunk in chunks {
            match stored.iter_mut().find(|c| c.id == chunk.id) {
                Some(existing) => *existing = chunk.clone(),
                None => stored.push(chunk.clone()),
            }
        }
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<u64> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|c| c.hash != hash);
        Ok((before - stored.len()) as u64)
    }

    async fn indexed_hashes(&self) -> Result<BTreeSet<String>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.iter().map(|c| c.hash.clone()).collect())
    }

    async fn load_chunks(&self) -> Result<Vec<IndexedChunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.clone())
    }

    async fn chunk_count(&self) -> Result<u64> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::chunk_id;
    use std::collections::BTreeMap;

    fn chunk(hash: &str, index: usize, text: &str) -> IndexedChunk {
        IndexedChunk {
            id: chunk_id(hash, index),
            hash: hash.to_string(),
            chunk_index: index as i64,
            text: text.to_string(),
            vector: vec![1.0, 0.0],
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_hashes() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[chunk("a", 0, "x"), chunk("a", 1, "y"), chunk("b", 0, "z")])
            .await
            .unwrap();
        let hashes: Vec<String> = index.indexed_hashes().await.unwrap().into_iter().collect();
        assert_eq!(hashes, vec!["a", "b"]);
        assert_eq!(index.chunk_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let index = InMemoryIndex::new();
        index.upsert(&[chunk("a", 0, "old"), chunk("b", 0, "b")]).await.unwrap();
        index.upsert(&[chunk("a", 0, "new")]).await.unwrap();
        let all = index.load_chunks().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "new");
        assert_eq!(all[1].hash, "b");
    }

    #[tokio::test]
    async fn test_delete_by_hash_only_touches_that_hash() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[chunk("a", 0, "x"), chunk("a", 1, "y"), chunk("b", 0, "z")])
            .await
            .unwrap();
        assert_eq!(index.delete_by_hash("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_hash("a").await.unwrap(), 0);
        let remaining = index.load_chunks().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, "b");
    }
}
