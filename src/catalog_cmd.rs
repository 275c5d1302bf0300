//! `ragsync collect`, `ragsync remove`, and `ragsync catalog`.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::collector::collect_and_persist;
use crate::collector_fs::FilesystemCollector;
use crate::config::{Config, FilesystemCollectorConfig};
use crate::persist::PersistenceService;
use crate::sqlite_index::SqliteIndex;

fn persistence(config: &Config) -> Result<Arc<PersistenceService>> {
    let catalog = Arc::new(CatalogStore::open(&config.data.dir)?);
    Ok(Arc::new(PersistenceService::new(catalog)))
}

/// Scan the filesystem collector's root (or `root_override`) and persist
/// everything found.
pub async fn run_collect(config: &Config, root_override: Option<PathBuf>) -> Result<()> {
    let fs_config = match (&config.collectors.filesystem, root_override) {
        (Some(fs), Some(root)) => FilesystemCollectorConfig {
            root,
            ..fs.clone()
        },
        (Some(fs), None) => fs.clone(),
        (None, Some(root)) => FilesystemCollectorConfig::with_root(root),
        (None, None) => bail!(
            "No filesystem collector configured. Add [collectors.filesystem] to config or pass --root."
        ),
    };

    let collector = FilesystemCollector::new(fs_config);
    let report = collect_and_persist(&collector, persistence(config)?).await?;

    println!("collect {}", collector.root().display());
    println!("  persisted: {}", report.persisted.len());
    println!("  new: {}", report.new_count());
    println!("  failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("    {}: {}", failure.hash, failure.error);
    }
    println!("  retired: {}", report.retired.len());
    Ok(())
}

pub async fn run_remove(config: &Config, hash: &str) -> Result<()> {
    let persistence = persistence(config)?;
    let key = hash.to_string();
    let removed = tokio::task::spawn_blocking(move || persistence.remove(&key)).await??;
    if !removed {
        bail!("no resource with hash: {}", hash);
    }
    println!("removed {}", hash);
    Ok(())
}

/// Print every catalogued hash with its content file.
pub async fn run_list(config: &Config) -> Result<()> {
    let catalog = Arc::new(CatalogStore::open(&config.data.dir)?);
    let snapshot = tokio::task::spawn_blocking(move || catalog.snapshot()).await??;
    if snapshot.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }
    for (hash, content) in &snapshot.content {
        let marker = if snapshot.metadata.contains_key(hash) {
            " +meta"
        } else {
            ""
        };
        println!("{}  {}{}", hash, content, marker);
    }
    println!();
    println!("{} resources", snapshot.len());
    Ok(())
}

/// Create the data directory, empty catalogs, and the index schema.
/// Safe to run more than once.
pub async fn run_init(config: &Config) -> Result<()> {
    CatalogStore::open(&config.data.dir)?;
    let index = SqliteIndex::open(&config.db.path).await?;
    index.close().await;
    println!("Initialized data dir {}", config.data.dir.display());
    println!("Initialized index {}", config.db.path.display());
    Ok(())
}
