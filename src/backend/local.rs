//! Local filesystem backend
//!
//! Paths resolve directly under a root directory; "download" is a copy.
//! Caching is off by default since source and cache live on the same
//! filesystem, but stays available for callers that want snapshot
//! semantics.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::{glob_to_regex, StorageBackend};
use crate::config::{CacheOptions, LocalOptions};
use crate::error::StoreError;
use crate::uri::ParsedKey;

pub struct LocalBackend {
    root: PathBuf,
    id: String,
    options: LocalOptions,
}

impl LocalBackend {
    /// Create a backend rooted at a bare path or a `file://` URI
    pub fn new(base_uri: &str, options: LocalOptions) -> Result<Self, StoreError> {
        let parsed = ParsedKey::parse(base_uri);
        let root = match parsed.scheme.as_deref() {
            Some("file") => {
                if !parsed.host.is_empty() {
                    return Err(StoreError::Config(format!(
                        "file URIs must not carry a host: {}",
                        base_uri
                    )));
                }
                PathBuf::from("/").join(&parsed.path)
            }
            Some(other) => {
                return Err(StoreError::Config(format!(
                    "local backend cannot serve scheme {}",
                    other
                )))
            }
            None => PathBuf::from(base_uri),
        };

        let id = format!("file://{}", root.display());
        Ok(Self { root, id, options })
    }

    /// Resolve a relative path under the root, rejecting traversal
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::ParentDir => {
                    return Err(StoreError::Config(format!(
                        "path escapes the storage root: {}",
                        path
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::Config(format!(
                        "expected a relative path: {}",
                        path
                    )))
                }
                _ => {}
            }
        }
        Ok(self.root.join(relative))
    }
}

/// Recursively copy a directory tree
async fn copy_tree(src: &Path, dst: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(dst).await?;
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.metadata().await?.is_dir() {
                tokio::fs::create_dir_all(&target).await?;
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn scheme(&self) -> &str {
        "file"
    }

    fn cache_options(&self) -> &CacheOptions {
        &self.options.cache
    }

    fn local_source(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        let src = self.resolve(path)?;
        if !tokio::fs::try_exists(&src).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    async fn download_dataset(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        let src = self.resolve(path)?;
        if !tokio::fs::try_exists(&src).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        copy_tree(&src, dest)
            .await
            .map_err(|e| StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })
    }

    async fn upload(&self, local: &Path, path: &str) -> Result<(), StoreError> {
        let dest = self.resolve(path)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let result = if local.is_dir() {
            copy_tree(local, &dest).await
        } else {
            tokio::fs::copy(local, &dest).await.map(|_| ())
        };
        result.map_err(|e| StoreError::UploadFailed {
            path: path.to_string(),
            source: Box::new(e),
        })
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await?,
            Ok(_) => tokio::fs::remove_file(&target).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn list(&self, pattern: &str, recursive: bool) -> Result<Vec<String>, StoreError> {
        let matcher = glob_to_regex(pattern)?;
        let mut found = Vec::new();

        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(found);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.metadata().await?.is_dir() {
                    if recursive {
                        pending.push(path);
                    }
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let relative = relative.to_string_lossy().replace('\\', "/");
                if matcher.is_match(&relative) {
                    found.push(relative);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn is_dataset(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
