//! Persistence service: validate a resource, write its files, then link it
//! into the catalog.
//!
//! # Write path
//!
//! ```text
//! validate ──▶ write .tmp files ──▶ fsync ──▶ rename ──▶ size check ──▶ catalog commit
//! ```
//!
//! A resource only becomes visible to the synchronizer at the final step.
//! Anything that fails earlier removes the temp files (and any newly
//! renamed file for a hash that was not already catalogued), so a rejected
//! or failed resource leaves nothing behind.
//!
//! Persistence is synchronous filesystem work. Async callers should go
//! through `tokio::task::spawn_blocking`.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragsync_core::resource::{is_valid_hash, ContentKind, Resource, ResourceMetadata};

use crate::catalog::{CatalogSnapshot, CatalogStore};
use crate::error::PersistError;

/// Result of a successful [`PersistenceService::persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub hash: String,
    /// Content file, relative to the data directory.
    pub content_path: String,
    pub metadata_path: Option<String>,
    /// The hash was already catalogued; files were rewritten in place.
    pub already_present: bool,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub hash: String,
    pub error: PersistError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub persisted: Vec<PersistOutcome>,
    pub failed: Vec<BatchFailure>,
    /// Hashes removed because their collector no longer reports them.
    pub retired: Vec<String>,
}

impl BatchReport {
    /// Number of hashes that were not catalogued before this batch.
    pub fn new_count(&self) -> usize {
        self.persisted.iter().filter(|o| !o.already_present).count()
    }
}

pub struct PersistenceService {
    catalog: Arc<CatalogStore>,
}

impl PersistenceService {
    pub fn new(catalog: Arc<CatalogStore>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    /// Persist one resource. On error, the catalog is unchanged.
    pub fn persist<R: Resource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<PersistOutcome, PersistError> {
        let hash = resource.hash().to_string();
        let filename = validate(resource)?;
        let metadata_json = match resource.metadata() {
            Some(meta) => Some(serde_json::to_vec_pretty(meta)?),
            None => None,
        };
        let metadata_name = metadata_json.as_ref().map(|_| metadata_filename(&filename));

        let previous = self.catalog.snapshot()?;
        let already_present = previous.contains(&hash);
        let old_content = previous.content.get(&hash).map(String::as_str);
        let old_metadata = previous.metadata.get(&hash).map(String::as_str);

        let mut staged = Staged::default();
        let written = (|| -> Result<(), PersistError> {
            staged.write(self.catalog.data_dir(), &filename, resource.content())?;
            if let (Some(name), Some(bytes)) = (&metadata_name, &metadata_json) {
                staged.write(self.catalog.data_dir(), name, bytes)?;
            }
            staged.publish()?;
            self.catalog
                .commit(&hash, &filename, metadata_name.as_deref())?;
            Ok(())
        })();

        if let Err(e) = written {
            let still_linked: Vec<PathBuf> = old_content
                .into_iter()
                .chain(old_metadata)
                .map(|rel| self.catalog.resolve(rel))
                .collect();
            staged.discard(&still_linked);
            tracing::warn!(hash = %hash, error = %e, "persist failed");
            return Err(e);
        }

        // Files from an earlier persist of this hash under another name.
        if let Some(old) = old_content.filter(|old| *old != filename) {
            remove_quietly(&self.catalog.resolve(old));
        }
        if let Some(old) = old_metadata.filter(|old| Some(*old) != metadata_name.as_deref()) {
            remove_quietly(&self.catalog.resolve(old));
        }

        tracing::debug!(hash = %hash, filename = %filename, already_present, "persisted resource");

        Ok(PersistOutcome {
            hash,
            content_path: filename,
            metadata_path: metadata_name,
            already_present,
        })
    }

    /// Persist each resource independently. One failure never affects the
    /// others.
    pub fn persist_batch<'a, I, R>(&self, resources: I) -> BatchReport
    where
        I: IntoIterator<Item = &'a R>,
        R: Resource + ?Sized + 'a,
    {
        let mut report = BatchReport::default();
        for resource in resources {
            match self.persist(resource) {
                Ok(outcome) => report.persisted.push(outcome),
                Err(error) => report.failed.push(BatchFailure {
                    hash: resource.hash().to_string(),
                    error,
                }),
            }
        }
        tracing::info!(
            persisted = report.persisted.len(),
            new = report.new_count(),
            failed = report.failed.len(),
            "persist batch complete"
        );
        report
    }

    /// Remove a resource: catalog entries first, then its files. Returns
    /// whether the hash was catalogued.
    pub fn remove(&self, hash: &str) -> Result<bool, PersistError> {
        let Some(entry) = self.catalog.remove(hash)? else {
            return Ok(false);
        };
        remove_quietly(&self.catalog.resolve(&entry.content));
        if let Some(meta) = &entry.metadata {
            remove_quietly(&self.catalog.resolve(meta));
        }
        tracing::info!(hash, "removed resource");
        Ok(true)
    }

    /// Read a catalogued resource back from disk.
    pub fn load(
        &self,
        snapshot: &CatalogSnapshot,
        hash: &str,
    ) -> Result<StoredResource, PersistError> {
        let content_rel = snapshot.content.get(hash).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("hash {} is not catalogued", hash),
            )
        })?;
        let kind = ContentKind::from_filename(content_rel).ok_or_else(|| {
            PersistError::rejected(hash, format!("unrecognized file type: {}", content_rel))
        })?;
        let content = fs::read(self.catalog.resolve(content_rel))?;
        let metadata = match snapshot.metadata.get(hash) {
            Some(meta_rel) => Some(self.read_metadata(meta_rel)?),
            None => None,
        };
        Ok(StoredResource {
            hash: hash.to_string(),
            filename: content_rel.clone(),
            kind,
            content,
            metadata,
        })
    }

    /// Metadata of every catalogued hash not in `keep`. Entries whose
    /// metadata file cannot be read are logged and left out.
    pub fn metadata_except(
        &self,
        keep: &BTreeSet<String>,
    ) -> Result<Vec<(String, ResourceMetadata)>, PersistError> {
        let snapshot = self.catalog.snapshot()?;
        let mut found = Vec::new();
        for (hash, meta_rel) in &snapshot.metadata {
            if keep.contains(hash) {
                continue;
            }
            match self.read_metadata(meta_rel) {
                Ok(meta) => found.push((hash.clone(), meta)),
                Err(e) => tracing::warn!(hash = %hash, error = %e, "unreadable metadata"),
            }
        }
        Ok(found)
    }

    fn read_metadata(&self, relative: &str) -> Result<ResourceMetadata, PersistError> {
        let bytes = fs::read(self.catalog.resolve(relative))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A resource as read back from the data directory.
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub hash: String,
    pub filename: String,
    pub kind: ContentKind,
    pub content: Vec<u8>,
    pub metadata: Option<ResourceMetadata>,
}

impl StoredResource {
    /// Text handed to the chunker: the (lossily decoded) text for text
    /// kinds, a one-line description for images.
    pub fn index_text(&self) -> String {
        if self.kind.is_text() {
            String::from_utf8_lossy(&self.content).into_owned()
        } else {
            let name = self
                .metadata
                .as_ref()
                .map(|m| m.display_name.as_str())
                .unwrap_or(&self.filename);
            format!("{} ({})", name, self.kind)
        }
    }
}

impl Resource for StoredResource {
    fn hash(&self) -> &str {
        &self.hash
    }
    fn kind(&self) -> ContentKind {
        self.kind
    }
    fn filename(&self) -> String {
        self.filename.clone()
    }
    fn content(&self) -> &[u8] {
        &self.content
    }
    fn metadata(&self) -> Option<&ResourceMetadata> {
        self.metadata.as_ref()
    }
}

pub fn metadata_filename(content_filename: &str) -> String {
    format!("{}.meta.json", content_filename)
}

/// Check a resource against the persistence rules, returning its filename.
pub fn validate<R: Resource + ?Sized>(resource: &R) -> Result<String, PersistError> {
    let hash = resource.hash();
    if hash.is_empty() {
        return Err(PersistError::rejected(hash, "empty hash"));
    }
    if !is_valid_hash(hash) {
        return Err(PersistError::rejected(
            hash,
            "hash may only contain ASCII letters, digits, '-' and '_'",
        ));
    }

    let filename = resource.filename();
    if filename.contains('/') || filename.contains('\\') {
        return Err(PersistError::rejected(
            hash,
            format!("filename contains a path separator: {}", filename),
        ));
    }
    if ContentKind::from_filename(&filename).is_none() {
        return Err(PersistError::rejected(
            hash,
            format!("unrecognized file type: {}", filename),
        ));
    }

    let content = resource.content();
    if content.is_empty() {
        return Err(PersistError::rejected(hash, "empty content"));
    }
    if resource.kind().is_text() {
        match std::str::from_utf8(content) {
            Ok(text) if text.trim().is_empty() => {
                return Err(PersistError::rejected(hash, "empty content"));
            }
            Ok(_) => {}
            Err(_) => {
                return Err(PersistError::rejected(hash, "text content is not valid UTF-8"));
            }
        }
    }

    if let Some(meta) = resource.metadata() {
        if meta.display_name.trim().is_empty() {
            return Err(PersistError::rejected(hash, "metadata display_name is empty"));
        }
    }

    Ok(filename)
}

/// Files written to temp paths and (after `publish`) renamed into place.
#[derive(Default)]
struct Staged {
    pending: Vec<(PathBuf, PathBuf, u64)>,
    published: Vec<PathBuf>,
}

impl Staged {
    fn write(&mut self, dir: &Path, name: &str, bytes: &[u8]) -> Result<(), PersistError> {
        let tmp = dir.join(format!(".{}.tmp", name));
        self.pending
            .push((tmp.clone(), dir.join(name), bytes.len() as u64));
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn publish(&mut self) -> Result<(), PersistError> {
        for (tmp, dest, expected) in &self.pending {
            fs::rename(tmp, dest)?;
            self.published.push(dest.clone());
            let actual = fs::metadata(dest)?.len();
            if actual != *expected {
                return Err(std::io::Error::other(format!(
                    "size check failed for {}: wrote {} bytes, found {}",
                    dest.display(),
                    expected,
                    actual
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Drop temp files and every published file the catalog does not
    /// still point at.
    fn discard(&self, still_linked: &[PathBuf]) {
        for (tmp, _, _) in &self.pending {
            remove_quietly(tmp);
        }
        for path in self.published.iter().filter(|p| !still_linked.contains(p)) {
            remove_quietly(path);
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}
