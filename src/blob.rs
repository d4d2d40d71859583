//! Raw content storage.
//!
//! Uploaded bytes are kept under the key `"{content_id}.{ext}"` so the
//! original file can be recovered independently of the extracted text.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the key they were stored under.
    async fn put(&self, content_id: &str, ext: &str, bytes: &[u8]) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

pub fn blob_key(content_id: &str, ext: &str) -> String {
    format!("{}.{}", content_id, ext)
}

/// Blob storage in a local directory, one file per key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            bail!("Invalid blob key: '{}'", key);
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, content_id: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let key = blob_key(content_id, ext);
        let path = self.path_for(&key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create blob directory: {}", self.root.display()))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob: {}", path.display()))?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read blob: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("blobs"));

        let key = store.put("abc", "pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(key, "abc.pdf");
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"%PDF-1.4"[..]));
        assert_eq!(store.get("missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        assert!(store.put("../evil", "txt", b"x").await.is_err());
        assert!(store.get("..").await.is_err());
    }
}
