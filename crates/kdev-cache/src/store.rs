use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use kdev_types::{CacheEntry, KdevError, Result};

/// Default file name inside the per-user configuration directory, shared
/// with caches written by earlier kdev releases
pub const CACHE_FILE_NAME: &str = ".kdev.js";

/// Whole cache document as persisted
type Document = BTreeMap<String, CacheEntry>;

/// Persisted key -> listing store
///
/// The file on disk is the source of truth: every operation re-reads it, so
/// deleting the file forces a cold cache even while kdev is running. Mutations
/// are read-modify-write cycles under a single lock and replace the document
/// through a temporary file and rename.
#[derive(Debug)]
pub struct ResourceCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResourceCache {
    /// Open the cache at `path`, creating an empty document if none exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };

        if !cache.path.exists() {
            cache.save(&Document::new())?;
        }

        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached entry for `key`, without touching the external tool
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let _guard = self.lock.lock();
        self.load().remove(key)
    }

    /// Store `value` under `key` and persist
    pub fn put(&self, key: &str, value: Vec<String>) -> Result<()> {
        let _guard = self.lock.lock();
        let mut doc = self.load();
        doc.insert(key.to_string(), CacheEntry::new(value));
        self.save(&doc)
    }

    /// Remove `key` and persist
    pub fn invalidate(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut doc = self.load();
        if doc.remove(key).is_some() {
            tracing::info!(key, "cache entry invalidated");
            self.save(&doc)?;
        }
        Ok(())
    }

    /// Every key currently cached
    pub fn keys(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        self.load().into_keys().collect()
    }

    /// Return the cached listing, or fetch, store and return a fresh one
    ///
    /// With `force` the cached entry is ignored. A failed fetch leaves the
    /// previous entry untouched. The lock is not held while `fetch` runs.
    pub async fn list_or_fetch<F, Fut>(&self, key: &str, force: bool, fetch: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        if !force {
            if let Some(entry) = self.get(key) {
                tracing::debug!(key, "cache hit");
                return Ok(entry.value);
            }
        }

        tracing::debug!(key, force, "fetching");
        let value = fetch().await?;
        self.put(key, value.clone())?;
        Ok(value)
    }

    /// Read the document; an unreadable one counts as empty
    fn load(&self) -> Document {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Document::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache unreadable, using empty cache");
                return Document::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "cache corrupt, using empty cache");
            Document::new()
        })
    }

    /// Replace the document on disk through a uniquely named sibling file
    fn save(&self, doc: &Document) -> Result<()> {
        let persistence = |e: io::Error| KdevError::Persistence(format!("{}: {e}", self.path.display()));

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(persistence)?;

        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| KdevError::Persistence(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(persistence)?;
        tmp.write_all(content.as_bytes()).map_err(persistence)?;
        tmp.as_file().sync_all().map_err(persistence)?;
        tmp.persist(&self.path).map_err(|e| persistence(e.error))?;

        Ok(())
    }
}
