//! End-to-end pipeline behaviour through the library API: persistence,
//! synchronization against the SQLite index, and retrieval.

use ragsync::catalog::CatalogStore;
use ragsync::config::Config;
use ragsync::embedding::HashingProvider;
use ragsync::persist::PersistenceService;
use ragsync::sqlite_index::SqliteIndex;
use ragsync::sync::{SyncSettings, Synchronizer};
use ragsync_core::embedding::EmbeddingProvider;
use ragsync_core::index::VectorIndex;
use ragsync_core::resource::{ContentKind, Resource, TextResource, Ticket, WebPage};
use ragsync_core::search::{HybridRetriever, RetrievalParams};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const H1_URL: &str = "https://course.example/problems/h1";

fn h1_text() -> String {
    let text = "Anti-Helmholtz Coils problem text. ".repeat(15);
    text[..500].to_string()
}

struct Pipeline {
    persistence: Arc<PersistenceService>,
    index: Arc<SqliteIndex>,
    embedder: Arc<HashingProvider>,
    sync: Synchronizer,
}

async fn pipeline(dir: &Path) -> Pipeline {
    let mut config = Config::default();
    config.embedding.backoff_base_ms = 1;
    let catalog = Arc::new(CatalogStore::open(&dir.join("data")).unwrap());
    let persistence = Arc::new(PersistenceService::new(catalog));
    let index = Arc::new(SqliteIndex::open(&dir.join("index.sqlite")).await.unwrap());
    let embedder = Arc::new(HashingProvider::new(256));
    let sync = Synchronizer::new(
        persistence.clone(),
        index.clone(),
        embedder.clone(),
        SyncSettings::from_config(&config),
    );
    Pipeline {
        persistence,
        index,
        embedder,
        sync,
    }
}

fn retriever<'a>(p: &'a Pipeline, params: RetrievalParams) -> HybridRetriever<'a> {
    HybridRetriever::new(&*p.index, &*p.embedder, params)
}

fn semantic_params() -> RetrievalParams {
    Config::default().retrieval_params()
}

fn seed(p: &Pipeline) -> WebPage {
    let h1 = WebPage::new(H1_URL, Some("Anti-Helmholtz Coils"), h1_text());
    p.persistence.persist(&h1).unwrap();
    p.persistence
        .persist(&TextResource::new(
            ContentKind::Text,
            "Docker deployment notes for the course server.",
        ))
        .unwrap();
    p.persistence
        .persist(&TextResource::new(
            ContentKind::Markdown,
            "Python machine learning homework with PyTorch.",
        ))
        .unwrap();
    h1
}

#[tokio::test]
async fn test_h1_is_one_chunk_and_ranks_first() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    let h1 = seed(&p);

    let report = p.sync.sync().await.unwrap();
    assert_eq!(report.added.len(), 3);
    assert!(report.failed.is_empty());

    let h1_chunks: Vec<_> = p
        .index
        .load_chunks()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.hash == h1.hash())
        .collect();
    assert_eq!(h1_chunks.len(), 1);
    assert_eq!(h1_chunks[0].id, format!("{}-0", h1.hash()));
    assert_eq!(h1_chunks[0].text.chars().count(), 500);
    assert_eq!(h1_chunks[0].url(), Some(H1_URL));

    let response = retriever(&p, semantic_params())
        .search("magnetic field of coils", 3)
        .await
        .unwrap();
    assert_eq!(response.hits.len(), 3);
    assert_eq!(response.hits[0].chunk.hash, h1.hash());
}

#[tokio::test]
async fn test_h1_removed_on_deletion() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    let h1 = seed(&p);
    p.sync.sync().await.unwrap();

    assert!(p.persistence.remove(h1.hash()).unwrap());
    let report = p.sync.sync().await.unwrap();
    assert_eq!(report.removed, vec![h1.hash().to_string()]);
    assert!(report.added.is_empty());

    assert!(!p.index.indexed_hashes().await.unwrap().contains(h1.hash()));
    let response = retriever(&p, semantic_params())
        .search("magnetic field of coils", 3)
        .await
        .unwrap();
    assert!(response.hits.iter().all(|h| h.chunk.hash != h1.hash()));
}

#[tokio::test]
async fn test_index_state_survives_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let p = pipeline(tmp.path()).await;
        seed(&p);
        p.sync.sync().await.unwrap();
        p.index.close().await;
    }

    let p = pipeline(tmp.path()).await;
    let report = p.sync.sync().await.unwrap();
    assert!(report.is_noop());
    assert_eq!(
        p.index.indexed_hashes().await.unwrap(),
        p.persistence.catalog().snapshot().unwrap().hashes()
    );
}

#[tokio::test]
async fn test_catalog_edit_between_passes() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    let v1 = TextResource::new(ContentKind::Text, "syllabus draft one");
    p.persistence.persist(&v1).unwrap();
    p.sync.sync().await.unwrap();

    // A second process persisting through its own handle.
    let other = PersistenceService::new(Arc::new(
        CatalogStore::open(&tmp.path().join("data")).unwrap(),
    ));
    let v2 = TextResource::new(ContentKind::Text, "syllabus draft two");
    other.persist(&v2).unwrap();
    other.remove(v1.hash()).unwrap();

    let report = p.sync.sync().await.unwrap();
    assert_eq!(report.added, vec![v2.hash().to_string()]);
    assert_eq!(report.removed, vec![v1.hash().to_string()]);
}

#[tokio::test]
async fn test_chunking_is_deterministic() {
    let long = "Maxwell's equations relate fields and sources.\n\n".repeat(80);
    let mut runs = Vec::new();
    for _ in 0..2 {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(tmp.path()).await;
        p.persistence
            .persist(&TextResource::new(ContentKind::Markdown, long.clone()))
            .unwrap();
        p.sync.sync().await.unwrap();
        let chunks: Vec<(String, String)> = p
            .index
            .load_chunks()
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.id, c.text))
            .collect();
        assert!(chunks.len() > 1);
        runs.push(chunks);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_threshold_gates_source_link() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    seed(&p);
    p.sync.sync().await.unwrap();

    let close = retriever(&p, semantic_params())
        .search("Anti-Helmholtz Coils problem text", 1)
        .await
        .unwrap();
    assert!(close.hits[0].distance < 0.5);
    assert!(close.include_source_link);
    assert_eq!(close.source_link.as_deref(), Some(H1_URL));

    let far = retriever(&p, semantic_params())
        .search("magnetic field of coils", 1)
        .await
        .unwrap();
    assert!(far.hits[0].distance >= 0.5);
    assert!(!far.include_source_link);
    assert!(far.source_link.is_none());
}

#[tokio::test]
async fn test_hybrid_ranking_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    seed(&p);
    p.persistence
        .persist(&Ticket::new(
            "OPS-12",
            "Deployment failing",
            "The Docker deployment fails on the course server.",
            &serde_json::Map::new(),
        ))
        .unwrap();
    p.sync.sync().await.unwrap();

    let mut params = semantic_params();
    params.hybrid = true;
    let first = retriever(&p, params.clone())
        .search("docker deployment", 4)
        .await
        .unwrap();
    let second = retriever(&p, params).search("docker deployment", 4).await.unwrap();

    let ids = |r: &ragsync_core::search::SearchResponse| -> Vec<String> {
        r.hits.iter().map(|h| h.chunk.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
    assert!(first.hits[0].lexical_score.is_some());
    let top = first.hits[0].chunk.display_name().unwrap_or_default().to_string();
    assert!(
        top == "Deployment failing" || first.hits[0].chunk.text.contains("Docker deployment"),
        "unexpected top hit: {}",
        top
    );
}

#[tokio::test]
async fn test_embedding_model_recorded() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path()).await;
    seed(&p);
    p.sync.sync().await.unwrap();
    for chunk in p.index.load_chunks().await.unwrap() {
        assert_eq!(chunk.metadata["embedding_model"], p.embedder.model_name());
        assert_eq!(chunk.vector.len(), p.embedder.dims());
    }
}
