//! Persistent content cache for cover art and chapter pages
//!
//! Blobs live under `blobs/` in a [`StorageProvider`]; a JSON manifest
//! (`index.json`) records which keys are present. A key enters the index only
//! after its blob has been written in full, so an indexed key always has a
//! readable blob.
//!
//! # Concurrency
//!
//! Each key gets its own async mutex, handed out from an in-flight table that
//! sits behind one short-lived lock. Callers racing on the same key run the
//! fetch once; callers on different keys never wait for each other.
//!
//! Manifest writes are coalesced: a mutation marks the manifest dirty and
//! whoever holds the flush lock writes the latest snapshot. A caller that finds
//! a flush in progress returns at once, and the running flush picks up its
//! change before it lets go.

mod keys;

pub use keys::{chapter_page_keys, cover_key, is_page_of, page_key};

use crate::error::{FetchError, Result, TankobonError};
use crate::storage::{sanitize_file_name, StorageProvider, PARTIAL_SUFFIX};
use crate::types::ChapterId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MANIFEST_PATH: &str = "index.json";
const BLOB_DIR: &str = "blobs";
const MANIFEST_VERSION: u32 = 1;

/// One indexed blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,

    /// Storage-relative path of the blob
    pub file: String,

    /// Blob size when it was stored
    pub size: u64,

    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// Summary for display
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

type KeySlot = Arc<tokio::sync::Mutex<()>>;

/// Content-addressed blob cache with insert-once-per-key semantics
pub struct ContentCache {
    storage: Arc<dyn StorageProvider>,
    index: RwLock<BTreeMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, KeySlot>>,
    manifest_lock: tokio::sync::Mutex<()>,
    manifest_dirty: AtomicBool,
}

impl ContentCache {
    /// Open the cache, reloading the manifest and dropping stale entries.
    ///
    /// Entries whose blob vanished are forgotten; blob files the manifest
    /// doesn't know about (including interrupted writes) are deleted.
    pub async fn open(storage: Arc<dyn StorageProvider>) -> Result<Self> {
        let manifest = match storage.read(MANIFEST_PATH).await {
            Ok(data) => match serde_json::from_slice::<Manifest>(&data) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache manifest: {}", e);
                    Manifest::default()
                }
            },
            Err(e) if e.is_not_found() => Manifest::default(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = BTreeMap::new();
        for (key, entry) in manifest.entries {
            if storage.exists(&entry.file).await? {
                entries.insert(key, entry);
            } else {
                tracing::warn!(key = %key, "Cached blob missing on open, dropping entry");
            }
        }

        let known: HashSet<String> = entries.values().map(|e| e.file.clone()).collect();
        let mut swept = 0usize;
        for name in storage.list(BLOB_DIR).await? {
            let file = format!("{}/{}", BLOB_DIR, name);
            if !known.contains(&file) {
                if !name.ends_with(PARTIAL_SUFFIX) {
                    tracing::debug!(file = %file, "Removing unindexed blob");
                }
                storage.delete(&file).await?;
                swept += 1;
            }
        }

        tracing::info!(entries = entries.len(), swept, "Opened content cache");
        Ok(Self {
            storage,
            index: RwLock::new(entries),
            in_flight: Mutex::new(HashMap::new()),
            manifest_lock: tokio::sync::Mutex::new(()),
            manifest_dirty: AtomicBool::new(false),
        })
    }

    /// Return the blob for `key`, running `fetch` on a miss.
    ///
    /// Concurrent callers with the same key share one fetch. A failed fetch
    /// leaves the cache untouched. If the fetched blob can't be written it is
    /// still returned, but the key stays unindexed and the next call refetches.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<u8>, FetchError>>,
    {
        if let Some(blob) = self.read_indexed(key).await? {
            tracing::debug!(key, "Cache hit");
            return Ok(blob);
        }

        let lease = self.lease(key);
        let _guard = lease.slot.lock().await;
        self.fetch_locked(key, fetch).await
    }

    async fn fetch_locked<F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<u8>, FetchError>>,
    {
        // Whoever held the slot before us may have filled it
        if let Some(blob) = self.read_indexed(key).await? {
            tracing::debug!(key, "Cache hit after waiting on in-flight fetch");
            return Ok(blob);
        }

        tracing::debug!(key, "Cache miss, fetching");
        let blob = fetch().await?;
        if let Err(e) = self.store(key, &blob).await {
            tracing::warn!(key, "Serving uncached blob: {}", e);
        }
        Ok(blob)
    }

    /// Insert a blob directly, replacing any existing entry
    pub async fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let lease = self.lease(key);
        let _guard = lease.slot.lock().await;
        self.store(key, blob).await
    }

    /// Read an indexed blob without fetching
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_indexed(key).await
    }

    /// Backing path of an indexed key
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.index
            .read()
            .get(key)
            .map(|entry| self.storage.locate(&entry.file))
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.index.read().contains_key(key)
    }

    /// Indexed keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.index.read().keys().cloned().collect()
    }

    /// Indexed entries in key order
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.index.read().values().cloned().collect()
    }

    /// Remove a key and its blob. Evicting an absent key is a no-op.
    pub async fn evict(&self, key: &str) -> Result<()> {
        self.evict_all([key]).await.map(|_| ())
    }

    /// Remove many keys, writing the manifest once. Returns how many were present.
    pub async fn evict_all<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut removed = 0usize;
        for key in keys {
            let key = key.as_ref();
            let lease = self.lease(key);
            {
                // Hold the key so a concurrent refetch can't land between unindex and delete
                let _guard = lease.slot.lock().await;
                let entry = self.index.write().remove(key);
                if let Some(entry) = entry {
                    match self.storage.delete(&entry.file).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => tracing::warn!(key, "Failed to delete evicted blob: {}", e),
                    }
                    removed += 1;
                }
            }
        }

        if removed == 0 {
            return Ok(0);
        }
        // A manifest that still lists a deleted blob is repaired on open
        self.persist().await?;
        tracing::info!(count = removed, "Evicted cache entries");
        Ok(removed)
    }

    /// Evict every page of one chapter
    pub async fn evict_chapter(&self, chapter_id: &ChapterId) -> Result<usize> {
        let keys: Vec<String> = self
            .index
            .read()
            .keys()
            .filter(|key| is_page_of(key, chapter_id))
            .cloned()
            .collect();
        self.evict_all(keys).await
    }

    /// Evict oldest entries (ties broken by key) until at most `max_bytes` remain.
    ///
    /// Returns the evicted keys in eviction order.
    pub async fn prune_to(&self, max_bytes: u64) -> Result<Vec<String>> {
        let victims = {
            let index = self.index.read();
            let mut total: u64 = index.values().map(|e| e.size).sum();
            let mut by_age: Vec<&CacheEntry> = index.values().collect();
            by_age.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));

            let mut victims = Vec::new();
            for entry in by_age {
                if total <= max_bytes {
                    break;
                }
                total -= entry.size;
                victims.push(entry.key.clone());
            }
            victims
        };

        self.evict_all(&victims).await?;
        Ok(victims)
    }

    /// Sum of blob sizes on storage.
    ///
    /// Blobs deleted out of band are skipped, not treated as failure.
    pub async fn total_size(&self) -> u64 {
        let files: Vec<(String, String)> = self
            .index
            .read()
            .values()
            .map(|e| (e.key.clone(), e.file.clone()))
            .collect();

        let mut total = 0;
        for (key, file) in files {
            match self.storage.size(&file).await {
                Ok(size) => total += size,
                Err(e) => tracing::warn!(key = %key, "Skipping blob in size count: {}", e),
            }
        }
        total
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.read().len(),
            bytes: self.total_size().await,
        }
    }

    async fn read_indexed(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file = match self.index.read().get(key) {
            Some(entry) => entry.file.clone(),
            None => return Ok(None),
        };

        match self.storage.read(&file).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(key, "Cached blob deleted out of band, refetching");
                self.index.write().remove(key);
                if let Err(e) = self.persist().await {
                    tracing::warn!(key, "Failed to persist cache manifest: {}", e);
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        let file = blob_path(key);
        self.storage
            .write(&file, blob)
            .await
            .map_err(|source| TankobonError::CacheWrite {
                key: key.to_string(),
                source,
            })?;

        self.index.write().insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                file,
                size: blob.len() as u64,
                stored_at: Utc::now(),
            },
        );
        if let Err(e) = self.persist().await {
            // The blob is complete, so the in-memory entry stays valid
            tracing::warn!(key, "Failed to persist cache manifest: {}", e);
        }
        tracing::info!(key, bytes = blob.len(), "Stored blob");
        Ok(())
    }

    /// Mark the manifest dirty and write it unless another flush is running
    async fn persist(&self) -> Result<()> {
        self.manifest_dirty.store(true, Ordering::SeqCst);
        loop {
            {
                let Ok(_guard) = self.manifest_lock.try_lock() else {
                    return Ok(());
                };
                while self.manifest_dirty.swap(false, Ordering::SeqCst) {
                    if let Err(e) = self.write_manifest().await {
                        self.manifest_dirty.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
            // A change that raced our release is ours to write
            if !self.manifest_dirty.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    async fn write_manifest(&self) -> Result<()> {
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries: self.index.read().clone(),
        };
        let data = serde_json::to_vec_pretty(&manifest)?;
        self.storage.write(MANIFEST_PATH, &data).await?;
        Ok(())
    }

    fn lease<'a>(&'a self, key: &'a str) -> KeyLease<'a> {
        let slot = Arc::clone(self.in_flight.lock().entry(key.to_string()).or_default());
        KeyLease {
            cache: self,
            key,
            slot,
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// A handle on one key's slot in the in-flight table.
///
/// Dropping it (also when the owning future is cancelled) removes the slot
/// once no other caller holds it.
struct KeyLease<'a> {
    cache: &'a ContentCache,
    key: &'a str,
    slot: KeySlot,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        // Only the table and this handle left: nobody else is waiting
        if Arc::strong_count(&self.slot) == 2 {
            in_flight.remove(self.key);
        }
    }
}

/// Storage path of a key's blob.
///
/// Keys that sanitize lossily get a hash suffix so distinct keys never share a file.
fn blob_path(key: &str) -> String {
    let name = sanitize_file_name(key);
    if name == key {
        format!("{}/{}", BLOB_DIR, name)
    } else {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        format!("{}/{}-{}", BLOB_DIR, name, &digest[..12])
    }
}
