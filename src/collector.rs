//! Collectors: producers of [`Resource`]s.
//!
//! A collector scans some external source and hands back resources with
//! their hashes already computed. It never writes anything; the output goes
//! through [`collect_and_persist`] into the persistence service.
//!
//! The filesystem collector is built in. Other sources (web scrapers,
//! ticket APIs) implement [`Collector`] in their own crates:
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use ragsync_core::resource::{Resource, ResourceMetadata};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::persist::{BatchReport, PersistenceService};

#[async_trait]
pub trait Collector: Send + Sync {
    /// Short identifier used in logs (e.g. `"filesystem"`).
    fn name(&self) -> &str;

    /// Scan the source and return every resource it currently holds.
    async fn collect(&self) -> Result<Vec<Box<dyn Resource>>>;

    /// Whether a catalogued resource with this metadata came from this
    /// collector. Owned entries missing from a later scan are retired.
    fn owns(&self, _metadata: &ResourceMetadata) -> bool {
        false
    }
}

/// Run a collector, persist its output, and retire the catalogued
/// resources it owns that the scan no longer returned.
///
/// Per-resource failures are in the returned report; only a failed scan
/// is an error. A source whose new version failed to persist keeps its
/// previous version.
pub async fn collect_and_persist(
    collector: &dyn Collector,
    persistence: Arc<PersistenceService>,
) -> Result<BatchReport> {
    let resources = collector.collect().await?;
    tracing::info!(
        collector = collector.name(),
        resources = resources.len(),
        "collected resources"
    );
    let names: BTreeMap<String, Option<String>> = resources
        .iter()
        .map(|r| {
            let name = r.metadata().map(|m| m.display_name.clone());
            (r.hash().to_string(), name)
        })
        .collect();

    let svc = persistence.clone();
    let mut report = tokio::task::spawn_blocking(move || svc.persist_batch(&resources)).await?;
    for failure in &report.failed {
        tracing::warn!(
            collector = collector.name(),
            hash = %failure.hash,
            error = %failure.error,
            "resource not persisted"
        );
    }

    let failed_names: BTreeSet<String> = report
        .failed
        .iter()
        .filter_map(|f| names.get(&f.hash).cloned().flatten())
        .collect();
    let scanned: BTreeSet<String> = names.into_keys().collect();
    let svc = persistence.clone();
    let candidates = tokio::task::spawn_blocking(move || svc.metadata_except(&scanned)).await??;
    let stale: Vec<String> = candidates
        .into_iter()
        .filter(|(_, meta)| collector.owns(meta) && !failed_names.contains(&meta.display_name))
        .map(|(hash, _)| hash)
        .collect();
    if stale.is_empty() {
        return Ok(report);
    }

    let svc = persistence;
    report.retired = tokio::task::spawn_blocking(move || {
        stale
            .into_iter()
            .filter(|hash| match svc.remove(hash) {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::warn!(hash = %hash, error = %e, "failed to retire resource");
                    false
                }
            })
            .collect::<Vec<_>>()
    })
    .await?;
    tracing::info!(
        collector = collector.name(),
        retired = report.retired.len(),
        "retired resources no longer at the source"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogStore;
    use ragsync_core::resource::{ContentKind, TextResource};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves `(name, body)` pairs tagged `source=notes`.
    struct NotesCollector(Mutex<Vec<(&'static str, &'static str)>>);

    impl NotesCollector {
        fn set(&self, notes: Vec<(&'static str, &'static str)>) {
            *self.0.lock().unwrap() = notes;
        }
    }

    fn note(name: &str, body: &str) -> TextResource {
        TextResource::from_source(ContentKind::Text, name, body)
            .with_metadata(ResourceMetadata::new(name).with_extra("source", "notes"))
    }

    #[async_trait]
    impl Collector for NotesCollector {
        fn name(&self) -> &str {
            "notes"
        }

        async fn collect(&self) -> Result<Vec<Box<dyn Resource>>> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .map(|(name, body)| Box::new(note(name, body)) as Box<dyn Resource>)
                .collect())
        }

        fn owns(&self, metadata: &ResourceMetadata) -> bool {
            metadata.extra.get("source").map(String::as_str) == Some("notes")
        }
    }

    fn service(tmp: &TempDir) -> Arc<PersistenceService> {
        Arc::new(PersistenceService::new(Arc::new(
            CatalogStore::open(tmp.path()).unwrap(),
        )))
    }

    #[tokio::test]
    async fn test_edited_and_deleted_sources_are_retired() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        let notes = NotesCollector(Mutex::new(vec![("a", "one"), ("b", "two")]));
        let foreign = TextResource::new(ContentKind::Text, "posted over http")
            .with_metadata(ResourceMetadata::new("upload"));
        svc.persist(&foreign).unwrap();

        let first = collect_and_persist(&notes, svc.clone()).await.unwrap();
        assert_eq!(first.new_count(), 2);
        assert!(first.retired.is_empty());

        notes.set(vec![("a", "one, edited")]);
        let second = collect_and_persist(&notes, svc.clone()).await.unwrap();
        assert_eq!(second.new_count(), 1);
        let mut expected = vec![
            note("a", "one").hash().to_string(),
            note("b", "two").hash().to_string(),
        ];
        expected.sort();
        let mut retired = second.retired.clone();
        retired.sort();
        assert_eq!(retired, expected);

        let hashes = svc.catalog().snapshot().unwrap().hashes();
        assert_eq!(hashes.len(), 2);
        assert!(hashes.contains(foreign.hash()));
        assert!(hashes.contains(note("a", "one, edited").hash()));
    }

    #[tokio::test]
    async fn test_failed_new_version_keeps_old() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        let notes = NotesCollector(Mutex::new(vec![("a", "one")]));
        collect_and_persist(&notes, svc.clone()).await.unwrap();

        notes.set(vec![("a", "   ")]);
        let report = collect_and_persist(&notes, svc.clone()).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.retired.is_empty());
        assert!(svc.catalog().snapshot().unwrap().contains(note("a", "one").hash()));
    }

    #[tokio::test]
    async fn test_collectors_without_ownership_retire_nothing() {
        struct Once;

        #[async_trait]
        impl Collector for Once {
            fn name(&self) -> &str {
                "once"
            }
            async fn collect(&self) -> Result<Vec<Box<dyn Resource>>> {
                Ok(Vec::new())
            }
        }

        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        svc.persist(&note("a", "one")).unwrap();
        let report = collect_and_persist(&Once, svc.clone()).await.unwrap();
        assert!(report.retired.is_empty());
        assert_eq!(svc.catalog().snapshot().unwrap().len(), 1);
    }
}
