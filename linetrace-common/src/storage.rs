//! Object storage for evidence files
//!
//! Objects are addressed by `/`-separated relative paths whose segments have
//! already been sanitized by the caller.

use crate::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Binary object storage backend
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `path`; fails if the object exists and `overwrite` is false
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str, overwrite: bool) -> Result<()>;

    /// URL under which a stored object can be fetched
    fn public_url(&self, path: &str) -> String;

    /// Object paths under a prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Object storage on the local filesystem
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path below the root, refusing anything that escapes it
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(Error::InvalidInput(format!("Invalid object path: {:?}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str, overwrite: bool) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if overwrite {
            tokio::fs::write(&target, bytes).await?;
        } else {
            // create_new makes the existence check and the create one step
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
                    _ => Error::Io(e),
                })?;
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        debug!("Stored {} ({} bytes, {})", path, bytes.len(), content_type);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix)?
        };

        let mut found = Vec::new();
        if !tokio::fs::try_exists(&start).await? {
            return Ok(found);
        }

        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    found.push(key.join("/"));
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path(), "http://host/evidence/");

        storage
            .upload("MANGA/123456789/a.jpg", b"jpeg", "image/jpeg", false)
            .await
            .unwrap();
        storage
            .upload("MANGA/123456789/b.png", b"png", "image/png", false)
            .await
            .unwrap();
        storage
            .upload("PNM/987654321/c.jpg", b"jpeg", "image/jpeg", false)
            .await
            .unwrap();

        let listed = storage.list("MANGA/123456789").await.unwrap();
        assert_eq!(listed, vec!["MANGA/123456789/a.jpg", "MANGA/123456789/b.png"]);
        assert!(storage.list("MANGA/000000000").await.unwrap().is_empty());
        assert_eq!(
            storage.public_url("MANGA/123456789/a.jpg"),
            "http://host/evidence/MANGA/123456789/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_overwrite_flag() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path(), "http://host");

        storage.upload("x/y.jpg", b"1", "image/jpeg", false).await.unwrap();
        let again = storage.upload("x/y.jpg", b"2", "image/jpeg", false).await;
        assert!(matches!(again, Err(Error::AlreadyExists(_))));

        storage.upload("x/y.jpg", b"2", "image/jpeg", true).await.unwrap();
        let content = std::fs::read(dir.path().join("x/y.jpg")).unwrap();
        assert_eq!(content, b"2");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_to_one_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path(), "http://host");

        let (first, second) = tokio::join!(
            storage.upload("x/race.jpg", b"first", "image/jpeg", false),
            storage.upload("x/race.jpg", b"second", "image/jpeg", false),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(Error::AlreadyExists(_))))
                .count(),
            1
        );
        let content = std::fs::read(dir.path().join("x/race.jpg")).unwrap();
        assert!(content == b"first" || content == b"second");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path(), "http://host");

        for bad in ["../x.jpg", "/etc/passwd", "a/../../b", ""] {
            let result = storage.upload(bad, b"x", "image/jpeg", true).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))), "accepted {:?}", bad);
        }
    }
}
