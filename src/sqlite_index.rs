//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text and
//! flattened metadata (JSON). Each upsert and delete runs in one
//! transaction, so a resource's chunks appear or disappear together.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ragsync_core::embedding::{blob_to_vec, vec_to_blob};
use ragsync_core::index::{IndexedChunk, VectorIndex};

use crate::{db, migrate};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `db_path` and make sure the schema exists.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path)
            .await
            .with_context(|| format!("Failed to open index database: {}", db_path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, hash, chunk_index, text, embedding, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    hash = excluded.hash,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.hash)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.vector))
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn indexed_hashes(&self) -> Result<BTreeSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT DISTINCT hash FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn load_chunks(&self) -> Result<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            "SELECT id, hash, chunk_index, text, embedding, metadata_json FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<IndexedChunk> {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
                    .with_context(|| {
                        format!("corrupt metadata for chunk {}", row.get::<String, _>("id"))
                    })?;
                Ok(IndexedChunk {
                    id: row.get("id"),
                    hash: row.get("hash"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    vector: blob_to_vec(&blob),
                    metadata,
                })
            })
            .collect()
    }

    async fn chunk_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragsync_core::index::chunk_id;
    use tempfile::TempDir;

    fn chunk(hash: &str, index: usize, text: &str) -> IndexedChunk {
        let mut metadata = BTreeMap::new();
        metadata.insert("hash".to_string(), hash.to_string());
        metadata.insert("display_name".to_string(), format!("{} doc", hash));
        IndexedChunk {
            id: chunk_id(hash, index),
            hash: hash.to_string(),
            chunk_index: index as i64,
            text: text.to_string(),
            vector: vec![0.5, -1.0, 2.0],
            metadata,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_order() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
        index
            .upsert(&[chunk("b", 0, "b0"), chunk("a", 0, "a0"), chunk("a", 1, "a1")])
            .await
            .unwrap();

        let all = index.load_chunks().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b-0", "a-0", "a-1"]);
        assert_eq!(all[0].vector, vec![0.5, -1.0, 2.0]);
        assert_eq!(all[0].display_name(), Some("b doc"));

        let hashes: Vec<String> = index.indexed_hashes().await.unwrap().into_iter().collect();
        assert_eq!(hashes, vec!["a", "b"]);
        assert_eq!(index.chunk_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_keeps_position() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
        index.upsert(&[chunk("a", 0, "old"), chunk("b", 0, "b")]).await.unwrap();
        index.upsert(&[chunk("a", 0, "new")]).await.unwrap();

        let all = index.load_chunks().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "new");
    }

    #[tokio::test]
    async fn test_delete_by_hash() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
        index
            .upsert(&[chunk("a", 0, "x"), chunk("a", 1, "y"), chunk("b", 0, "z")])
            .await
            .unwrap();
        assert_eq!(index.delete_by_hash("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_hash("missing").await.unwrap(), 0);
        assert_eq!(index.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_is_durable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        {
            let index = SqliteIndex::open(&path).await.unwrap();
            index.upsert(&[chunk("a", 0, "persisted")]).await.unwrap();
            index.close().await;
        }
        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.load_chunks().await.unwrap()[0].text, "persisted");
    }
}
