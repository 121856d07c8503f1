//! Mock storage backend for testing (in-memory HashMap storage)

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{glob_to_regex, StorageBackend};
use crate::config::CacheOptions;
use crate::error::StoreError;

/// Mock backend that stores objects in memory and counts downloads
pub(crate) struct MockBackend {
    id: String,
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    cache: CacheOptions,
    downloads: AtomicUsize,
    fail_downloads: RwLock<bool>,
}

impl MockBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            cache: CacheOptions::default(),
            downloads: AtomicUsize::new(0),
            fail_downloads: RwLock::new(false),
        }
    }

    pub fn put(&self, path: &str, data: impl Into<Bytes>) {
        self.objects.write().insert(path.to_string(), data.into());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        *self.fail_downloads.write() = fail;
    }

    fn dataset_parts(&self, path: &str) -> Vec<(String, Bytes)> {
        let base = format!("{}/", path.trim_end_matches('/'));
        self.objects
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(&base))
            .map(|(key, data)| (key[base.len()..].to_string(), data.clone()))
            .collect()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn scheme(&self) -> &str {
        "mock"
    }

    fn cache_options(&self) -> &CacheOptions {
        &self.cache
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if *self.fail_downloads.read() {
            return Err(StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "simulated download failure",
                )),
            });
        }
        let data = self
            .objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        tokio::fs::write(dest, data).await?;
        Ok(())
    }

    async fn download_dataset(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if *self.fail_downloads.read() {
            return Err(StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "simulated download failure",
                )),
            });
        }
        let parts = self.dataset_parts(path);
        if parts.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        for (part, data) in parts {
            let target = dest.join(&part);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, data).await?;
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, path: &str) -> Result<(), StoreError> {
        let data = tokio::fs::read(local).await?;
        self.put(path, data);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().contains_key(path) || !self.dataset_parts(path).is_empty())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if self.objects.write().remove(path).is_none() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn list(&self, pattern: &str, _recursive: bool) -> Result<Vec<String>, StoreError> {
        let matcher = glob_to_regex(pattern)?;
        let mut found: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }

    async fn is_dataset(&self, path: &str) -> Result<bool, StoreError> {
        Ok(!self.dataset_parts(path).is_empty())
    }
}
