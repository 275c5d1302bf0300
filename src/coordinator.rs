//! Pipeline wiring and the polling loop.
//!
//! A [`Coordinator`] owns one persistence service, one synchronizer, and
//! the collectors configured for this instance. `serve` spawns
//! [`Coordinator::spawn_polling`], which runs a pass at startup and then
//! every `sync.poll_interval_secs`. Passes never overlap: the polling loop,
//! `POST /sync`, and `ragsync sync` all go through [`Coordinator::run_pass`],
//! which holds a mutex for the whole pass.

use anyhow::Result;
use ragsync_core::embedding::EmbeddingProvider;
use ragsync_core::error::SearchError;
use ragsync_core::index::VectorIndex;
use ragsync_core::search::{HybridRetriever, RetrievalParams, SearchResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::catalog::CatalogStore;
use crate::collector::{collect_and_persist, Collector};
use crate::collector_fs::FilesystemCollector;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::persist::{BatchReport, PersistenceService};
use crate::sqlite_index::SqliteIndex;
use crate::sync::{SyncPlan, SyncReport, SyncSettings, Synchronizer};

pub struct Coordinator {
    persistence: Arc<PersistenceService>,
    synchronizer: Synchronizer,
    retrieval: RetrievalParams,
    collectors: Vec<Box<dyn Collector>>,
    collect_before_sync: bool,
    pass_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(
        persistence: Arc<PersistenceService>,
        synchronizer: Synchronizer,
        retrieval: RetrievalParams,
    ) -> Self {
        Self {
            persistence,
            synchronizer,
            retrieval,
            collectors: Vec::new(),
            collect_before_sync: false,
            pass_lock: Mutex::new(()),
        }
    }

    /// Open the catalog, the SQLite index, and the embedding provider named
    /// in `config`, and register the filesystem collector if configured.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let catalog = Arc::new(CatalogStore::open(&config.data.dir)?);
        let persistence = Arc::new(PersistenceService::new(catalog));
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(&config.db.path).await?);
        let embedder = create_provider(&config.embedding)?;
        let synchronizer = Synchronizer::new(
            persistence.clone(),
            index,
            embedder,
            SyncSettings::from_config(config),
        );

        let mut coordinator = Self::new(persistence, synchronizer, config.retrieval_params());
        if let Some(fs) = &config.collectors.filesystem {
            coordinator =
                coordinator.with_collector(Box::new(FilesystemCollector::new(fs.clone())));
        }
        coordinator.collect_before_sync = config.sync.collect_before_sync;
        Ok(coordinator)
    }

    pub fn with_collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn collect_before_sync(mut self, enabled: bool) -> Self {
        self.collect_before_sync = enabled;
        self
    }

    pub fn persistence(&self) -> &Arc<PersistenceService> {
        &self.persistence
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.synchronizer.index()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        self.synchronizer.embedder()
    }

    pub fn retrieval_params(&self) -> &RetrievalParams {
        &self.retrieval
    }

    pub fn has_collectors(&self) -> bool {
        !self.collectors.is_empty()
    }

    /// Run every registered collector and persist what it found. A collector
    /// whose scan fails is logged and skipped.
    pub async fn collect(&self) -> Result<BatchReport> {
        let mut merged = BatchReport::default();
        for collector in &self.collectors {
            match collect_and_persist(collector.as_ref(), self.persistence.clone()).await {
                Ok(report) => {
                    merged.persisted.extend(report.persisted);
                    merged.failed.extend(report.failed);
                    merged.retired.extend(report.retired);
                }
                Err(e) => {
                    tracing::error!(collector = collector.name(), error = %e, "collector failed");
                }
            }
        }
        Ok(merged)
    }

    /// Run one synchronization pass, waiting for any pass in progress.
    pub async fn run_pass(&self) -> Result<SyncReport> {
        let _guard = self.pass_lock.lock().await;
        if self.collect_before_sync {
            self.collect().await?;
        }
        self.synchronizer.sync().await
    }

    pub async fn plan(&self) -> Result<SyncPlan> {
        self.synchronizer.plan().await
    }

    /// Query the index with this instance's retrieval parameters. `hybrid`
    /// overrides the configured mode for this query only.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        hybrid: Option<bool>,
    ) -> Result<SearchResponse, SearchError> {
        let mut params = self.retrieval.clone();
        if let Some(hybrid) = hybrid {
            params.hybrid = hybrid;
        }
        let retriever = HybridRetriever::new(
            self.index().as_ref(),
            self.embedder().as_ref(),
            params,
        );
        retriever.search(query, k).await
    }

    /// Run a pass now and then every `interval` until the task is aborted.
    /// A failed pass is logged; the loop keeps going.
    pub fn spawn_polling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.run_pass().await {
                    Ok(report) if report.is_noop() => tracing::debug!("index up to date"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %format!("{:#}", e), "sync pass failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use ragsync_core::index::InMemoryIndex;
    use ragsync_core::resource::{ContentKind, Resource, TextResource};
    use tempfile::TempDir;

    struct StaticCollector(Vec<&'static str>);

    #[async_trait::async_trait]
    impl Collector for StaticCollector {
        fn name(&self) -> &str {
            "static"
        }
        async fn collect(&self) -> Result<Vec<Box<dyn Resource>>> {
            Ok(self
                .0
                .iter()
                .map(|t| Box::new(TextResource::new(ContentKind::Text, *t)) as Box<dyn Resource>)
                .collect())
        }
    }

    fn coordinator(tmp: &TempDir) -> Coordinator {
        let catalog = Arc::new(CatalogStore::open(tmp.path()).unwrap());
        let persistence = Arc::new(PersistenceService::new(catalog));
        let mut config = Config::default();
        config.embedding.backoff_base_ms = 1;
        let synchronizer = Synchronizer::new(
            persistence.clone(),
            Arc::new(InMemoryIndex::new()),
            Arc::new(HashingProvider::new(64)),
            SyncSettings::from_config(&config),
        );
        Coordinator::new(persistence, synchronizer, config.retrieval_params())
    }

    #[tokio::test]
    async fn test_collect_then_pass() {
        let tmp = TempDir::new().unwrap();
        let c = coordinator(&tmp)
            .with_collector(Box::new(StaticCollector(vec!["one doc", "two doc"])))
            .collect_before_sync(true);

        let report = c.run_pass().await.unwrap();
        assert_eq!(report.added.len(), 2);
        assert!(c.plan().await.unwrap().to_add.is_empty());

        let hits = c.search("two doc", 1, None).await.unwrap().hits;
        assert_eq!(hits[0].chunk.text, "two doc");
    }

    #[tokio::test]
    async fn test_concurrent_passes_do_not_double_index() {
        let tmp = TempDir::new().unwrap();
        let c = Arc::new(coordinator(&tmp));
        for i in 0..5 {
            let res = TextResource::new(ContentKind::Text, format!("doc {}", i));
            c.persistence().persist(&res).unwrap();
        }

        let (a, b) = tokio::join!(c.run_pass(), c.run_pass());
        let total = a.unwrap().added.len() + b.unwrap().added.len();
        assert_eq!(total, 5);
        assert_eq!(c.index().chunk_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_polling_picks_up_new_resources() {
        let tmp = TempDir::new().unwrap();
        let c = Arc::new(coordinator(&tmp));
        let handle = c.clone().spawn_polling(Duration::from_millis(20));

        let res = TextResource::new(ContentKind::Text, "arrives later");
        c.persistence().persist(&res).unwrap();

        let mut indexed = false;
        for _ in 0..100 {
            if c.index().indexed_hashes().await.unwrap().contains(res.hash()) {
                indexed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(indexed);
    }
}
