//! Backing storage for cached blobs

use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Suffix of in-progress writes; never a valid cache file
pub const PARTIAL_SUFFIX: &str = ".part";

/// Abstract storage provider trait
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Read data from the given path
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write data to the given path.
    ///
    /// Must be atomic: readers see either the old state or the whole blob.
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Delete data at the given path
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// List entries directly under the given prefix
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Get the size of a file in bytes
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// Where the object lives, for consumers that open files themselves
    fn locate(&self, path: &str) -> PathBuf;
}

/// Local filesystem storage provider
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage provider with the given root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Safely resolve a path, preventing path traversal attacks
    fn full_path(&self, path: &str) -> StorageResult<PathBuf> {
        let mut normalized = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                    return Err(StorageError::BackendError(
                        "Path traversal attempt detected".to_string(),
                    ));
                }
            }
        }

        Ok(self.root.join(normalized))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(path)?;
        tokio::fs::read(full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let full_path = self.full_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(path, e))?;
        }

        // Write beside the target then rename, so a crash never leaves a torn blob
        let mut temp_name = full_path.clone().into_os_string();
        temp_name.push(format!(".{}{}", uuid::Uuid::new_v4().simple(), PARTIAL_SUFFIX));
        let temp_path = PathBuf::from(temp_name);

        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(path, e));
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &full_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(path, e));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let full_path = self.full_path(path)?;
        tokio::fs::remove_file(full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full_path = self.full_path(prefix)?;
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&full_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StorageError::from_io(prefix, e)),
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(prefix, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let full_path = self.full_path(path)?;
        tokio::fs::try_exists(full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let full_path = self.full_path(path)?;
        let metadata = tokio::fs::metadata(full_path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(metadata.len())
    }

    fn locate(&self, path: &str) -> PathBuf {
        self.full_path(path)
            .unwrap_or_else(|_| self.root.join(sanitize_file_name(path)))
    }
}

/// In-memory storage provider (for testing)
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an object behind the cache's back
    pub fn remove_out_of_band(&self, path: &str) -> bool {
        self.data.write().remove(path).is_some()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.data
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.data.write().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.data
            .write()
            .remove(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = prefix.trim_end_matches('/');
        let mut names: Vec<String> = self
            .data
            .read()
            .keys()
            .filter_map(|k| {
                let rest = if dir.is_empty() {
                    k.as_str()
                } else {
                    k.strip_prefix(dir)?.strip_prefix('/')?
                };
                // Direct children only, like a directory listing
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.data.read().contains_key(path))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.data
            .read()
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn locate(&self, path: &str) -> PathBuf {
        PathBuf::from(path)
    }
}

/// Map an arbitrary key onto a portable file name.
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept; everything else becomes
/// `_`. Leading dots are replaced so keys never produce hidden files or `..`.
pub fn sanitize_file_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.starts_with('.') {
        name.replace_range(0..1, "_");
    }
    if name.is_empty() {
        name.push('_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();

        storage.write("test.txt", b"hello").await.unwrap();
        assert_eq!(storage.read("test.txt").await.unwrap(), b"hello");

        assert!(storage.exists("test.txt").await.unwrap());
        assert!(!storage.exists("missing.txt").await.unwrap());
        assert_eq!(storage.size("test.txt").await.unwrap(), 5);

        storage.delete("test.txt").await.unwrap();
        assert!(!storage.exists("test.txt").await.unwrap());
        assert!(storage.delete("test.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_memory_list_matches_directory_semantics() {
        let storage = MemoryStorage::new();
        storage.write("blobs/b", b"1").await.unwrap();
        storage.write("blobs/a", b"2").await.unwrap();
        storage.write("blobs/nested/c", b"3").await.unwrap();
        storage.write("index.json", b"{}").await.unwrap();

        assert_eq!(storage.list("blobs").await.unwrap(), vec!["a", "b"]);
        assert_eq!(storage.list("").await.unwrap(), vec!["index.json"]);
    }

    #[tokio::test]
    async fn test_local_storage_atomic_write_leaves_no_partials() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write("blobs/a", b"one").await.unwrap();
        storage.write("blobs/a", b"two").await.unwrap();

        assert_eq!(storage.read("blobs/a").await.unwrap(), b"two");
        assert_eq!(storage.list("blobs").await.unwrap(), vec!["a".to_string()]);
        assert_eq!(storage.locate("blobs/a"), dir.path().join("blobs").join("a"));
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(storage.write("../escape", b"x").await.is_err());
        assert!(storage.read("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_local_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("absent"));
        assert!(storage.list("").await.unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("cover-abc"), "cover-abc");
        assert_eq!(sanitize_file_name("ch/1 2"), "ch_1_2");
        assert_eq!(sanitize_file_name(".."), "_.");
        assert_eq!(sanitize_file_name(""), "_");
    }
}
