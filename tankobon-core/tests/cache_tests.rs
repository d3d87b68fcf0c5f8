//! Content cache tests for tankobon-core
//!
//! These run against [`LocalStorage`] in a temporary directory, so atomic
//! writes, out-of-band deletions and manifest reloads hit a real filesystem.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tankobon_core::cache::{chapter_page_keys, page_key};
use tankobon_core::storage::{LocalStorage, StorageProvider, StorageResult};
use tankobon_core::{ChapterId, ContentCache, FetchError, StorageError, TankobonError};
use tempfile::TempDir;

async fn local_cache() -> (ContentCache, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::open(Arc::new(LocalStorage::new(dir.path())))
        .await
        .unwrap();
    (cache, dir)
}

/// Local storage whose blob writes always fail, as on a full disk
struct ReadOnlyBlobs(LocalStorage);

#[async_trait]
impl StorageProvider for ReadOnlyBlobs {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.0.read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        if path.starts_with("blobs/") {
            return Err(StorageError::BackendError("no space left on device".into()));
        }
        self.0.write(path, data).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.0.delete(path).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.0.list(prefix).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.0.exists(path).await
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.0.size(path).await
    }

    fn locate(&self, path: &str) -> PathBuf {
        self.0.locate(path)
    }
}

// =============================================================================
// Fetch coalescing
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_fetch_once() {
    let (cache, _dir) = local_cache().await;
    let cache = Arc::new(cache);
    let fetches = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            tokio::spawn(async move {
                cache
                    .get_or_fetch("cover-w1", || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(b"cover art".to_vec())
                    })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), b"cover art");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(cache.keys(), vec!["cover-w1".to_string()]);
}

#[tokio::test]
async fn test_failed_fetch_is_retried() {
    let (cache, _dir) = local_cache().await;

    let err = cache
        .get_or_fetch("c-0", || async { Err(FetchError::Timeout("page".into())) })
        .await
        .unwrap_err();
    assert!(matches!(err, TankobonError::Fetch(FetchError::Timeout(_))));
    assert!(!cache.is_cached("c-0"));

    let blob = cache
        .get_or_fetch("c-0", || async { Ok(b"page".to_vec()) })
        .await
        .unwrap();
    assert_eq!(blob, b"page");
}

// =============================================================================
// Write failures
// =============================================================================

#[tokio::test]
async fn test_write_failure_serves_blob_without_indexing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(ReadOnlyBlobs(LocalStorage::new(dir.path())));
    let cache = ContentCache::open(storage).await.unwrap();
    let fetches = AtomicUsize::new(0);

    for _ in 0..2 {
        let blob = cache
            .get_or_fetch("c-0", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(b"page".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(blob, b"page");
        assert!(!cache.is_cached("c-0"));
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    let err = cache.put("c-1", b"page").await.unwrap_err();
    assert!(matches!(err, TankobonError::CacheWrite { ref key, .. } if key == "c-1"));
}

// =============================================================================
// Eviction and sizing
// =============================================================================

#[tokio::test]
async fn test_evict_removes_file_and_is_idempotent() {
    let (cache, _dir) = local_cache().await;
    cache.put("cover-w1", b"img").await.unwrap();
    let path = cache.path_for("cover-w1").unwrap();
    assert!(path.exists());

    cache.evict("cover-w1").await.unwrap();
    assert!(!cache.is_cached("cover-w1"));
    assert!(cache.path_for("cover-w1").is_none());
    assert!(!path.exists());

    cache.evict("cover-w1").await.unwrap();
    cache.evict("never-stored").await.unwrap();
}

#[tokio::test]
async fn test_evict_chapter_leaves_other_chapters() {
    let (cache, _dir) = local_cache().await;
    let chapter = ChapterId::from("c1");
    for key in chapter_page_keys(&chapter, 3) {
        cache.put(&key, b"p").await.unwrap();
    }
    cache.put(&page_key(&ChapterId::from("c10"), 0), b"p").await.unwrap();

    assert_eq!(cache.evict_chapter(&chapter).await.unwrap(), 3);
    assert_eq!(cache.keys(), vec!["c10-0".to_string()]);
}

#[tokio::test]
async fn test_total_size_skips_deleted_files() {
    let (cache, _dir) = local_cache().await;
    cache.put("a", b"12345").await.unwrap();
    cache.put("b", b"123").await.unwrap();
    assert_eq!(cache.total_size().await, 8);

    std::fs::remove_file(cache.path_for("a").unwrap()).unwrap();
    assert_eq!(cache.total_size().await, 3);

    // The stale entry is dropped on the next read
    assert_eq!(cache.get("a").await.unwrap(), None);
    assert!(!cache.is_cached("a"));
}

#[tokio::test]
async fn test_prune_evicts_oldest_first() {
    let (cache, _dir) = local_cache().await;
    cache.put("a", &[0; 10]).await.unwrap();
    cache.put("b", &[0; 10]).await.unwrap();
    cache.put("c", &[0; 10]).await.unwrap();

    let evicted = cache.prune_to(15).await.unwrap();
    assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(cache.keys(), vec!["c".to_string()]);
    assert!(cache.prune_to(15).await.unwrap().is_empty());

    let stats = cache.stats().await;
    assert_eq!((stats.entries, stats.bytes), (1, 10));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_all_reach_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(
        ContentCache::open(Arc::new(LocalStorage::new(dir.path())))
            .await
            .unwrap(),
    );

    let tasks: Vec<_> = (0..20)
        .map(|n| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.put(&format!("c1-{}", n), b"page").await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }
    drop(cache);

    let reopened = ContentCache::open(Arc::new(LocalStorage::new(dir.path())))
        .await
        .unwrap();
    assert_eq!(reopened.keys().len(), 20);
}

#[tokio::test]
async fn test_reopen_restores_index() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = ContentCache::open(Arc::new(LocalStorage::new(dir.path())))
            .await
            .unwrap();
        cache.put("cover-w1", b"img").await.unwrap();
        cache.put("c1-0", b"page").await.unwrap();
        std::fs::remove_file(cache.path_for("c1-0").unwrap()).unwrap();
    }
    std::fs::write(dir.path().join("blobs").join("torn.part"), b"half").unwrap();

    let cache = ContentCache::open(Arc::new(LocalStorage::new(dir.path())))
        .await
        .unwrap();
    assert_eq!(cache.keys(), vec!["cover-w1".to_string()]);
    assert_eq!(cache.get("cover-w1").await.unwrap(), Some(b"img".to_vec()));
    assert!(!dir.path().join("blobs").join("torn.part").exists());
}

#[tokio::test]
async fn test_unsafe_keys_stay_inside_root() {
    let (cache, dir) = local_cache().await;
    cache.put("../../etc/passwd", b"x").await.unwrap();
    cache.put("..-..-etc-passwd", b"y").await.unwrap();

    let first = cache.path_for("../../etc/passwd").unwrap();
    let second = cache.path_for("..-..-etc-passwd").unwrap();
    assert!(first.starts_with(dir.path()));
    assert_ne!(first, second);
    assert_eq!(cache.get("../../etc/passwd").await.unwrap(), Some(b"x".to_vec()));
}
