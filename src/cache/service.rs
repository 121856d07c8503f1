//! Cache service
//!
//! Orchestrates cache lookup, fetch-on-miss, invalidation, and expiry
//! sweeping. This is the only component with concurrency concerns: two
//! concurrent fetches for the same key take a per-key lock, so one
//! download runs and the other reuses the fresh entry. Slots are
//! promoted with an atomic rename, so the index never points at a
//! partially-written blob.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::entry::{CacheKey, EntryMetadata};
use super::index::CacheIndex;
use super::utils::{epoch_now, hash_key, slot_path, slot_size, DEFAULT_HASH_SEED};
use crate::backend::StorageBackend;
use crate::error::StoreError;

pub struct CacheService {
    cache_dir: PathBuf,
    entries_dir: PathBuf,
    index_path: PathBuf,
    /// TTL for new entries, in hours; 0 means entries never expire
    expiry_hours: u64,
    index: CacheIndex,
    /// Per-key locks serializing concurrent fetches of the same object
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl CacheService {
    /// Open (or create) a cache rooted at `cache_dir`.
    ///
    /// Loads the persisted index and reconciles it with the entries
    /// directory before serving anything.
    pub async fn open(
        cache_dir: impl Into<PathBuf>,
        expiry_hours: u64,
    ) -> Result<Self, StoreError> {
        let cache_dir = cache_dir.into();
        let entries_dir = cache_dir.join("entries");
        let index_path = cache_dir.join("index.json");

        tokio::fs::create_dir_all(&entries_dir).await?;
        let index = CacheIndex::load_from_file(&index_path).await?;
        index.validate_and_repair(&entries_dir).await?;

        Ok(Self {
            cache_dir,
            entries_dir,
            index_path,
            expiry_hours,
            index,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn expiry_hours(&self) -> u64 {
        self.expiry_hours
    }

    pub fn entry_count(&self) -> usize {
        self.index.entry_count()
    }

    /// Fetch a single object, returning the local blob path.
    ///
    /// With `bypass_cache`, or when no valid non-expired entry exists,
    /// the object is downloaded into a fresh slot and the entry is
    /// refreshed. Otherwise the existing slot path is returned unchanged.
    pub async fn fetch(
        &self,
        backend: &dyn StorageBackend,
        path: &str,
        bypass_cache: bool,
    ) -> Result<PathBuf, StoreError> {
        self.fetch_inner(backend, path, bypass_cache, false).await
    }

    /// Fetch a dataset (directory tree); the slot is a directory
    pub async fn fetch_dataset(
        &self,
        backend: &dyn StorageBackend,
        path: &str,
        bypass_cache: bool,
    ) -> Result<PathBuf, StoreError> {
        self.fetch_inner(backend, path, bypass_cache, true).await
    }

    async fn fetch_inner(
        &self,
        backend: &dyn StorageBackend,
        path: &str,
        bypass_cache: bool,
        dataset: bool,
    ) -> Result<PathBuf, StoreError> {
        let key = CacheKey::new(backend.id(), path);

        let lock = self.lock_for(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.fetch_locked(backend, &key, bypass_cache, dataset).await
        };
        drop(lock);
        self.release_lock(&key).await;
        result
    }

    async fn fetch_locked(
        &self,
        backend: &dyn StorageBackend,
        key: &CacheKey,
        bypass_cache: bool,
        dataset: bool,
    ) -> Result<PathBuf, StoreError> {
        let now = epoch_now();

        if !bypass_cache {
            if let Some(meta) = self.index.get(key) {
                let blob_present = tokio::fs::try_exists(&meta.blob_path).await.unwrap_or(false);
                if !meta.is_expired(now) && blob_present {
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(meta.blob_path);
                }
                if !blob_present {
                    // index said present but the blob is gone: repair
                    self.index.remove(key);
                }
            }
        }

        let hash = hash_key(DEFAULT_HASH_SEED, &key.backend_id, &key.path);
        let slot = slot_path(&self.entries_dir, &hash, dataset);
        let tmp = self
            .entries_dir
            .join(format!("{}.{}.tmp", hash, Uuid::new_v4()));

        let downloaded = if dataset {
            match tokio::fs::create_dir_all(&tmp).await {
                Ok(()) => backend.download_dataset(&key.path, &tmp).await,
                Err(e) => Err(e.into()),
            }
        } else {
            backend.download(&key.path, &tmp).await
        };

        if let Err(e) = downloaded {
            remove_quietly(&tmp).await;
            return Err(e);
        }

        // Promote the finished temp into the slot. Plain files rename over
        // the old slot atomically; directories need the old tree cleared.
        if dataset && tokio::fs::try_exists(&slot).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&slot).await?;
        }
        tokio::fs::rename(&tmp, &slot).await?;

        let size = slot_size(&slot).await;
        let expires_at = if self.expiry_hours == 0 {
            0
        } else {
            now + self.expiry_hours * 3600
        };
        let meta = EntryMetadata::new(key.clone(), slot.clone(), dataset, size, now, expires_at);
        self.index.insert(key.clone(), meta);
        self.persist_index().await;

        tracing::debug!(key = %key, slot = %slot.display(), "cached fresh download");
        Ok(slot)
    }

    /// Remove one cached entry and its blob; no-op if absent
    pub async fn invalidate(&self, backend_id: &str, path: &str) {
        let key = CacheKey::new(backend_id, path);
        match self.index.remove(&key) {
            Some(meta) => {
                remove_quietly(&meta.blob_path).await;
                self.persist_index().await;
                tracing::debug!(key = %key, "invalidated cache entry");
            }
            None => tracing::debug!(key = %key, "invalidate: no cache entry"),
        }
    }

    /// Remove every expired entry and its blob; returns the count removed
    pub async fn sweep_expired(&self) -> usize {
        let now = epoch_now();
        let mut removed = 0;
        for key in self.index.expired_keys(now) {
            if let Some(meta) = self.index.remove(&key) {
                remove_quietly(&meta.blob_path).await;
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist_index().await;
            tracing::info!(removed, "swept expired cache entries");
        }
        removed
    }

    async fn persist_index(&self) {
        if let Err(e) = self.index.save_to_file(&self.index_path).await {
            tracing::warn!(error = %e, "failed to persist cache index");
        }
    }

    async fn lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_lock(&self, key: &CacheKey) {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(lock) = in_flight.get(key) {
            if Arc::strong_count(lock) == 1 {
                in_flight.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn index(&self) -> &CacheIndex {
        &self.index
    }
}

/// Delete a slot or temp path (file or directory), logging failures.
/// Cleanup must never mask the primary error or result.
async fn remove_quietly(path: &Path) {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "cleanup failed");
    }
}
