//! Artifact (blob) storage
//!
//! Uploaded files are content-addressed by SHA-256: storing the same bytes
//! twice is a no-op, so a circular sent to N employees occupies one file.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DocumentError, Result};

/// Stored artifact reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Lowercase hex SHA-256 of the contents
    pub hash: String,
    pub size: u64,
}

/// SHA-256 content hash as 64 lowercase hex characters
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Store `bytes`, returning the content hash (idempotent)
    async fn put(&self, bytes: &[u8]) -> Result<StoredArtifact>;

    async fn get(&self, hash: &str) -> Result<Vec<u8>>;

    /// Remove an artifact; missing artifacts are not an error
    async fn remove(&self, hash: &str) -> Result<()>;

    async fn contains(&self, hash: &str) -> Result<bool>;
}

/// Filesystem storage: `{root}/{hash[0..2]}/{hash}`
#[derive(Debug, Clone)]
pub struct FsArtifactStorage {
    root: PathBuf,
}

impl FsArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DocumentError::InvalidInput(format!(
                "invalid artifact hash '{}'",
                hash
            )));
        }
        Ok(self.root.join(&hash[..2]).join(hash))
    }
}

#[async_trait]
impl ArtifactStorage for FsArtifactStorage {
    async fn put(&self, bytes: &[u8]) -> Result<StoredArtifact> {
        let hash = content_hash(bytes);
        let path = self.path_for(&hash)?;
        let artifact = StoredArtifact {
            hash,
            size: bytes.len() as u64,
        };

        if tokio::fs::try_exists(&path).await? {
            debug!(hash = %artifact.hash, "Artifact already stored");
            return Ok(artifact);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never see a partial file
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(hash = %artifact.hash, size = artifact.size, "Stored artifact");
        Ok(artifact)
    }

    async fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.path_for(hash)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(DocumentError::NotFound(format!("artifact {}", hash)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, hash: &str) -> Result<()> {
        let path = self.path_for(hash)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(hash = %hash, "Removed artifact");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(hash = %hash, "Artifact already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, hash: &str) -> Result<bool> {
        let path = self.path_for(hash)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_is_content_addressed() {
        let dir = TempDir::new().unwrap();
        let storage = FsArtifactStorage::new(dir.path());

        let first = storage.put(b"circular").await.unwrap();
        let second = storage.put(b"circular").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.hash, content_hash(b"circular"));
        assert_eq!(storage.get(&first.hash).await.unwrap(), b"circular");

        let shard = dir.path().join(&first.hash[..2]);
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FsArtifactStorage::new(dir.path());
        let stored = storage.put(b"x").await.unwrap();

        storage.remove(&stored.hash).await.unwrap();
        storage.remove(&stored.hash).await.unwrap();
        assert!(!storage.contains(&stored.hash).await.unwrap());
        assert!(matches!(
            storage.get(&stored.hash).await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_like_hashes() {
        let dir = TempDir::new().unwrap();
        let storage = FsArtifactStorage::new(dir.path());
        assert!(matches!(
            storage.get("../../etc/passwd").await,
            Err(DocumentError::InvalidInput(_))
        ));
    }
}
