//! Filesystem collector.
//!
//! Walks `[collectors.filesystem].root`, keeps files matching the include
//! globs (and not the exclude globs; `.git`, `target`, and `node_modules`
//! are always excluded), and turns each into a resource whose kind comes
//! from the file extension. The hash covers the relative path and the
//! content, so identical files in two places stay distinct and any edit
//! produces a new hash.
//!
//! Metadata: `display_name` is the relative path; extras are `source`,
//! `root`, `path`, `url` (`file://…`), `size`, and `modified` (RFC 3339).
//!
//! `source` and `root` mark ownership: a later scan of the same root
//! retires catalogued files it no longer finds, so an edited file's old
//! version and a deleted file both leave the catalog.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ragsync_core::resource::{
    content_hash, ContentKind, ImageResource, Resource, ResourceMetadata, TextResource,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::collector::Collector;
use crate::config::FilesystemCollectorConfig;

pub struct FilesystemCollector {
    config: FilesystemCollectorConfig,
}

impl FilesystemCollector {
    pub fn new(config: FilesystemCollectorConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// The root as recorded in metadata: canonical when it exists.
    fn root_key(&self) -> String {
        self.config
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.config.root.clone())
            .display()
            .to_string()
    }

    /// Synchronous scan, sorted by relative path.
    pub fn scan(&self) -> Result<Vec<Box<dyn Resource>>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!(
                "Filesystem collector root does not exist: {}",
                root.display()
            );
        }

        let include_set = build_globset(&self.config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            files.push((rel_str, path.to_path_buf()));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let root_key = self.root_key();
        let mut resources = Vec::with_capacity(files.len());
        for (rel, path) in files {
            if let Some(resource) = file_to_resource(&path, &rel, &root_key)? {
                resources.push(resource);
            }
        }
        Ok(resources)
    }
}

#[async_trait]
impl Collector for FilesystemCollector {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn collect(&self) -> Result<Vec<Box<dyn Resource>>> {
        let collector = FilesystemCollector::new(self.config.clone());
        tokio::task::spawn_blocking(move || collector.scan()).await?
    }

    fn owns(&self, metadata: &ResourceMetadata) -> bool {
        metadata.extra.get("source").map(String::as_str) == Some("filesystem")
            && metadata.extra.get("root") == Some(&self.root_key())
    }
}

/// Build a resource for one file; `None` for files that cannot be stored
/// (unknown extension, non-UTF-8 text, empty).
fn file_to_resource(
    path: &Path,
    relative_path: &str,
    root_key: &str,
) -> Result<Option<Box<dyn Resource>>> {
    let Some(kind) = ContentKind::from_filename(relative_path) else {
        tracing::debug!(path = relative_path, "skipping file with unrecognized extension");
        return Ok(None);
    };

    let fs_meta = std::fs::metadata(path)?;
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        tracing::debug!(path = relative_path, "skipping empty file");
        return Ok(None);
    }

    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut metadata = ResourceMetadata::new(relative_path)
        .with_extra("source", "filesystem")
        .with_extra("root", root_key)
        .with_extra("path", relative_path)
        .with_extra("url", format!("file://{}", absolute.display()))
        .with_extra("size", fs_meta.len());
    if let Ok(modified) = fs_meta.modified() {
        let modified: DateTime<Utc> = modified.into();
        metadata = metadata.with_extra("modified", modified.to_rfc3339());
    }

    let resource: Box<dyn Resource> = if kind.is_text() {
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(path = relative_path, "skipping non-UTF-8 text file");
                return Ok(None);
            }
        };
        Box::new(TextResource::from_source(kind, relative_path, text).with_metadata(metadata))
    } else {
        let ContentKind::Image(format) = kind else {
            return Ok(None);
        };
        let hash = content_hash(&[relative_path.as_bytes(), bytes.as_slice()]);
        Box::new(
            ImageResource::new(format, bytes, relative_path)
                .with_hash(hash)
                .with_metadata(metadata),
        )
    };
    Ok(Some(resource))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
