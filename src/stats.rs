//! Catalog and index overview.
//!
//! Answers "is the index caught up?" by comparing the catalog with the
//! index: pending hashes are catalogued but not yet indexed, orphaned
//! hashes are indexed but no longer catalogued. Both drain to zero after a
//! clean sync pass. Used by `ragsync stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::coordinator::Coordinator;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub catalogued: usize,
    pub with_metadata: usize,
    pub indexed: usize,
    pub chunks: u64,
    pub pending: usize,
    pub orphaned: usize,
    /// Catalogued resources per content file extension.
    pub by_extension: BTreeMap<String, usize>,
}

pub async fn collect_stats(coordinator: &Coordinator) -> Result<Stats> {
    let catalog = coordinator.persistence().catalog().clone();
    let snapshot = tokio::task::spawn_blocking(move || catalog.snapshot()).await??;
    let indexed = coordinator.index().indexed_hashes().await?;
    let chunks = coordinator.index().chunk_count().await?;

    let mut by_extension = BTreeMap::new();
    for path in snapshot.content.values() {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("?")
            .to_string();
        *by_extension.entry(ext).or_insert(0) += 1;
    }

    let catalogued = snapshot.hashes();
    Ok(Stats {
        catalogued: catalogued.len(),
        with_metadata: snapshot.metadata.len(),
        indexed: indexed.len(),
        chunks,
        pending: catalogued.difference(&indexed).count(),
        orphaned: indexed.difference(&catalogued).count(),
        by_extension,
    })
}

/// Run the stats command: gather counts and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let stats = collect_stats(&coordinator).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ragsync stats");
    println!("=============");
    println!();
    println!("  Data dir:    {}", config.data.dir.display());
    println!("  Index:       {}", config.db.path.display());
    println!("  Index size:  {}", format_bytes(db_size));
    println!("  Model:       {}", coordinator.embedder().model_name());
    println!();
    println!(
        "  Catalogued:  {} ({} with metadata)",
        stats.catalogued, stats.with_metadata
    );
    println!("  Indexed:     {} ({} chunks)", stats.indexed, stats.chunks);
    println!("  Pending:     {}", stats.pending);
    println!("  Orphaned:    {}", stats.orphaned);

    if !stats.by_extension.is_empty() {
        println!();
        println!("  By type:");
        for (ext, count) in &stats.by_extension {
            println!("  {:<10} {:>6}", ext, count);
        }
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
