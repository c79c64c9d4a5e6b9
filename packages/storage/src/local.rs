//! Directory-tree store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{StorageError, StorageOperation, Store};

/// A [`Store`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn error(&self, key: &str, operation: StorageOperation, e: std::io::Error) -> StorageError {
        let path = self.location(key);
        if e.kind() == ErrorKind::NotFound {
            return StorageError::NotFound { path, operation };
        }
        let transient = matches!(
            e.kind(),
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
        );
        StorageError::Backend {
            path,
            operation,
            transient,
            source: Box::new(e),
        }
    }
}

#[async_trait]
impl Store for LocalStore {
    fn location(&self, key: &str) -> String {
        self.path_of(key).display().to_string()
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(key);
        log::debug!("Reading {}", path.display());
        tokio::fs::read(&path)
            .await
            .map_err(|e| self.error(key, StorageOperation::Get, e))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(key, StorageOperation::Put, e))?;
        }
        log::debug!("Writing {} ({} bytes)", path.display(), data.len());
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| self.error(key, StorageOperation::Put, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let start = self.path_of(prefix);
        let mut keys = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| self.error(prefix, StorageOperation::List, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| self.error(prefix, StorageOperation::List, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| self.error(prefix, StorageOperation::List, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crash_etl_local_store_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn put_then_get() {
        let root = temp_root("put_get");
        let store = LocalStore::new(&root);
        store
            .put("Final/CSV/Crash.csv", b"crash_id\nSA1\n".to_vec())
            .await
            .unwrap();
        let data = store.get("Final/CSV/Crash.csv").await.unwrap();
        assert_eq!(data, b"crash_id\nSA1\n");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = LocalStore::new(temp_root("missing"));
        let err = store.get("crash_nz/crash_nz.csv").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotFound {
                operation: StorageOperation::Get,
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn list_is_recursive_and_sorted() {
        let root = temp_root("list");
        let store = LocalStore::new(&root);
        for key in [
            "crash_qld/crash/part-1.parquet",
            "crash_qld/crash/part-0.parquet",
            "crash_qld/crash/nested/part-2.parquet",
            "crash_wa/crash/part-0.parquet",
        ] {
            store.put(key, vec![0]).await.unwrap();
        }
        let keys = store.list("crash_qld/crash").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "crash_qld/crash/nested/part-2.parquet",
                "crash_qld/crash/part-0.parquet",
                "crash_qld/crash/part-1.parquet",
            ]
        );
        let _ = std::fs::remove_dir_all(root);
    }
}
