//! The on-disk catalog: which resource hashes exist and where their files are.
//!
//! Two JSON maps live in the data directory:
//!
//! | File | Maps |
//! |------|------|
//! | `content_catalog.json` | hash → content file (relative to the data dir) |
//! | `metadata_catalog.json` | hash → metadata file, only for resources with metadata |
//!
//! Every mutation takes the in-process mutex and then an exclusive
//! advisory lock on `.catalog.lock`, rereads both maps from disk, applies
//! the change, and replaces each file by write-to-temp + rename. Reads
//! always go back to disk, so a long-lived [`CatalogStore`] never serves
//! stale entries written by another process.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::PersistError;

pub const CONTENT_CATALOG: &str = "content_catalog.json";
pub const METADATA_CATALOG: &str = "metadata_catalog.json";
const LOCK_FILE: &str = ".catalog.lock";

/// A point-in-time view of both catalogs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub content: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

impl CatalogSnapshot {
    /// Every catalogued hash, sorted.
    pub fn hashes(&self) -> BTreeSet<String> {
        self.content.keys().cloned().collect()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.content.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Paths that were catalogued for a hash before it was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntry {
    pub content: String,
    pub metadata: Option<String>,
}

pub struct CatalogStore {
    data_dir: PathBuf,
    mutex: Mutex<()>,
}

impl CatalogStore {
    /// Open (creating if needed) the catalog in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(data_dir)?;
        let store = Self {
            data_dir: data_dir.to_path_buf(),
            mutex: Mutex::new(()),
        };
        store.mutate(|_| Ok(()))?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Absolute path for a catalog-relative file path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.data_dir.join(relative)
    }

    /// Reload both catalogs from disk.
    pub fn snapshot(&self) -> Result<CatalogSnapshot, PersistError> {
        let lock_file = self.open_lock_file()?;
        let lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| PersistError::CatalogWriteConflict(format!("catalog read lock: {}", e)))?;
        self.read_maps()
    }

    /// Record `hash` with its content path and, if present, its metadata
    /// path. A `None` metadata path drops any existing metadata entry.
    pub fn commit(
        &self,
        hash: &str,
        content_path: &str,
        metadata_path: Option<&str>,
    ) -> Result<(), PersistError> {
        self.mutate(|snapshot| {
            snapshot
                .content
                .insert(hash.to_string(), content_path.to_string());
            match metadata_path {
                Some(path) => {
                    snapshot
                        .metadata
                        .insert(hash.to_string(), path.to_string());
                }
                None => {
                    snapshot.metadata.remove(hash);
                }
            }
            Ok(())
        })
    }

    /// Remove `hash` from both catalogs, returning its former paths.
    pub fn remove(&self, hash: &str) -> Result<Option<RemovedEntry>, PersistError> {
        self.mutate(|snapshot| {
            let metadata = snapshot.metadata.remove(hash);
            Ok(snapshot
                .content
                .remove(hash)
                .map(|content| RemovedEntry { content, metadata }))
        })
    }

    /// Run `f` against a fresh snapshot under both locks, then persist it.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut CatalogSnapshot) -> Result<T, PersistError>,
    ) -> Result<T, PersistError> {
        let _in_process = self
            .mutex
            .lock()
            .map_err(|_| PersistError::CatalogWriteConflict("catalog mutex poisoned".into()))?;

        let lock_file = self.open_lock_file()?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| PersistError::CatalogWriteConflict(format!("catalog write lock: {}", e)))?;

        let mut snapshot = self.read_maps()?;
        let before = snapshot.clone();
        let out = f(&mut snapshot)?;

        if snapshot.content != before.content || !self.catalog_path(CONTENT_CATALOG).exists() {
            self.write_map(CONTENT_CATALOG, &snapshot.content)?;
        }
        if snapshot.metadata != before.metadata || !self.catalog_path(METADATA_CATALOG).exists() {
            self.write_map(METADATA_CATALOG, &snapshot.metadata)?;
        }
        Ok(out)
    }

    fn open_lock_file(&self) -> Result<File, PersistError> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.data_dir.join(LOCK_FILE))?)
    }

    fn catalog_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn read_maps(&self) -> Result<CatalogSnapshot, PersistError> {
        Ok(CatalogSnapshot {
            content: self.read_map(CONTENT_CATALOG)?,
            metadata: self.read_map(METADATA_CATALOG)?,
        })
    }

    fn read_map(&self, name: &str) -> Result<BTreeMap<String, String>, PersistError> {
        let path = self.catalog_path(name);
        match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, name: &str, map: &BTreeMap<String, String>) -> Result<(), PersistError> {
        let path = self.catalog_path(name);
        let tmp = self.data_dir.join(format!(".{}.tmp", name));
        let bytes = serde_json::to_vec_pretty(map)?;

        let result = (|| -> Result<(), PersistError> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_empty_catalogs() {
        let tmp = TempDir::new().unwrap();
        let store = CatalogStore::open(tmp.path()).unwrap();
        assert!(tmp.path().join(CONTENT_CATALOG).exists());
        assert!(tmp.path().join(METADATA_CATALOG).exists());
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_commit_and_reload() {
        let tmp = TempDir::new().unwrap();
        let store = CatalogStore::open(tmp.path()).unwrap();
        store.commit("h1", "h1.txt", Some("h1.txt.meta.json")).unwrap();
        store.commit("h2", "h2.md", None).unwrap();

        let reopened = CatalogStore::open(tmp.path()).unwrap();
        let snap = reopened.snapshot().unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.content["h1"], "h1.txt");
        assert_eq!(snap.metadata["h1"], "h1.txt.meta.json");
        assert!(!snap.metadata.contains_key("h2"));
    }

    #[test]
    fn test_commit_without_metadata_drops_entry() {
        let tmp = TempDir::new().unwrap();
        let store = CatalogStore::open(tmp.path()).unwrap();
        store.commit("h1", "h1.txt", Some("h1.txt.meta.json")).unwrap();
        store.commit("h1", "h1.txt", None).unwrap();
        assert!(store.snapshot().unwrap().metadata.is_empty());
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let store = CatalogStore::open(tmp.path()).unwrap();
        store.commit("h1", "h1.txt", Some("h1.txt.meta.json")).unwrap();

        let removed = store.remove("h1").unwrap().unwrap();
        assert_eq!(removed.content, "h1.txt");
        assert_eq!(removed.metadata.as_deref(), Some("h1.txt.meta.json"));
        assert!(store.remove("h1").unwrap().is_none());
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_sees_other_handle_writes() {
        let tmp = TempDir::new().unwrap();
        let a = CatalogStore::open(tmp.path()).unwrap();
        let b = CatalogStore::open(tmp.path()).unwrap();
        b.commit("from-b", "from-b.txt", None).unwrap();
        assert!(a.snapshot().unwrap().contains("from-b"));
    }

    #[test]
    fn test_concurrent_commits_lose_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(CatalogStore::open(tmp.path()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let hash = format!("t{}-{}", t, i);
                        store.commit(&hash, &format!("{}.txt", hash), None).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.snapshot().unwrap().len(), 80);
    }

    #[test]
    fn test_corrupt_catalog_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = CatalogStore::open(tmp.path()).unwrap();
        fs::write(tmp.path().join(CONTENT_CATALOG), "{not json").unwrap();
        assert!(matches!(
            store.snapshot(),
            Err(PersistError::Serialization(_))
        ));
    }
}
