use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use log::debug;

use super::{BlobBackend, BlobError, BlobResult};

/// Blob store rooted at a local directory; each key maps to a file path below it.
pub struct LocalBlobStore {
    base_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_path(&self, key: &str) -> BlobResult<PathBuf> {
        let mut path = self.base_dir.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(BlobError::Backend(format!("invalid blob key '{}'", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobBackend for LocalBlobStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> BlobResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write beside the target and rename so a reader never sees a torn chunk.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Stored blob {} ({} bytes)", key, data.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_blob_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        let data = Bytes::from("hello chunk");
        store.put("owner/file/part1", data.clone(), "application/octet-stream").await.unwrap();
        assert_eq!(store.get("owner/file/part1").await.unwrap(), data);
        assert!(temp_dir.path().join("owner").join("file").join("part1").exists());

        // Overwrite
        store.put("owner/file/part1", Bytes::from("v2"), "application/octet-stream").await.unwrap();
        assert_eq!(store.get("owner/file/part1").await.unwrap(), Bytes::from("v2"));

        // Delete, twice
        store.delete("owner/file/part1").await.unwrap();
        store.delete("owner/file/part1").await.unwrap();
        assert!(matches!(store.get("owner/file/part1").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_blob_store_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        let res = store.put("owner/../escape", Bytes::from("x"), "text/plain").await;
        assert!(matches!(res, Err(BlobError::Backend(_))));
    }
}
