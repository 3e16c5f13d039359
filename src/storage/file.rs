//! Directory-backed object store.
//!
//! Objects live at `{root}/{path}`. Writes go to a hidden temp file in the
//! target directory and are renamed into place, so readers never observe a
//! partially written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_object_path, StorageConnector};
use crate::error::{Error, Result};

const TEMP_SUFFIX: &str = ".tmp";

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root` (created lazily on first upload)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_object_path(path)?;
        Ok(self.root.join(path))
    }

    /// Remove now-empty directories between `file` and the root.
    async fn prune_empty_dirs(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails (and stops) as soon as a directory is not empty.
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

#[async_trait]
impl StorageConnector for FileStore {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        let file_path = self.resolve(path)?;
        let parent = file_path
            .parent()
            .ok_or_else(|| Error::Internal(format!("object path '{}' has no parent", path)))?;

        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(error = %e, path = %parent.display(), "Failed to create storage directory");
            return Err(Error::StorageWriteError(format!("{}: {}", path, e)));
        }

        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(
            ".{}.{}{}",
            file_name,
            uuid::Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));

        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            tracing::error!(error = %e, path = %tmp_path.display(), "Failed to write object file");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::StorageWriteError(format!("{}: {}", path, e)));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &file_path).await {
            tracing::error!(error = %e, "Failed to rename temp object file");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::StorageWriteError(format!("{}: {}", path, e)));
        }

        tracing::debug!(path, size = data.len(), "Object stored");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let file_path = self.resolve(path)?;
        match tokio::fs::read(&file_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::StorageNotFound(path.to_string())),
            Err(e) => Err(Error::StorageReadError(format!("{}: {}", path, e))),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let file_path = self.resolve(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => {
                self.prune_empty_dirs(&file_path).await;
                tracing::debug!(path, "Object deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageDeleteError(format!("{}: {}", path, e))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file_path = self.resolve(path)?;
        match tokio::fs::metadata(&file_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageReadError(format!("{}: {}", path, e))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, relative)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::StorageReadError(format!("{}: {}", dir.display(), e))),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::StorageReadError(e.to_string()))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let object_path = if relative.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", relative, name)
                };

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::StorageReadError(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), object_path));
                } else if !(name.starts_with('.') && name.ends_with(TEMP_SUFFIX))
                    && object_path.starts_with(prefix)
                {
                    paths.push(object_path);
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.upload("blob-1/report.pdf", b"%PDF").await.unwrap();
        assert!(dir.path().join("blob-1").join("report.pdf").is_file());
        assert_eq!(store.download("blob-1/report.pdf").await.unwrap(), b"%PDF");
        assert!(store.exists("blob-1/report.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.upload("b/file.txt", b"one").await.unwrap();
        store.upload("b/file.txt", b"two").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("b"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(store.download("b/file.txt").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_delete_prunes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.upload("pair/k1-private", b"x").await.unwrap();
        store.upload("pair/k2-public", b"y").await.unwrap();

        assert!(store.delete("pair/k1-private").await.unwrap());
        assert!(dir.path().join("pair").is_dir());

        assert!(store.delete("pair/k2-public").await.unwrap());
        assert!(!dir.path().join("pair").exists());
        assert!(dir.path().exists());

        assert!(!store.delete("pair/k2-public").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.download("nope/x").await,
            Err(Error::StorageNotFound(_))
        ));
        assert!(!store.exists("nope/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("root"));
        assert!(store.upload("../outside", b"x").await.is_err());
        assert!(!dir.path().join("outside").exists());
    }

    #[tokio::test]
    async fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for path in ["b2/z.bin", "b1/a.txt", "b1/b.txt"] {
            store.upload(path, b"x").await.unwrap();
        }

        assert_eq!(
            store.list("").await.unwrap(),
            vec!["b1/a.txt", "b1/b.txt", "b2/z.bin"]
        );
        assert_eq!(store.list("b1/").await.unwrap().len(), 2);

        let empty = FileStore::new(dir.path().join("never-created"));
        assert!(empty.list("").await.unwrap().is_empty());
    }
}
