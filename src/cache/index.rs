//! Cache index management
//!
//! Thread-safe in-memory index of cached entries, persisted as a JSON
//! snapshot (`index.json`) in the cache directory. `validate_and_repair`
//! reconciles the index with the entries directory at startup: entries
//! whose blobs vanished are dropped, blobs nothing references are
//! deleted, and leftover `.tmp` files from interrupted downloads are
//! cleaned up.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::entry::{CacheKey, EntryMetadata};
use super::error::CacheError;
use super::utils::{epoch_now, slot_size};

/// Thread-safe in-memory index of cached entries
pub struct CacheIndex {
    entries: RwLock<HashMap<CacheKey, EntryMetadata>>,
    total_size: AtomicU64,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            total_size: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<EntryMetadata> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, metadata: EntryMetadata) {
        let size = metadata.size_bytes;
        if let Some(previous) = self.entries.write().insert(key, metadata) {
            self.total_size
                .fetch_sub(previous.size_bytes, Ordering::SeqCst);
        }
        self.total_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<EntryMetadata> {
        let removed = self.entries.write().remove(key);
        if let Some(ref metadata) = removed {
            self.total_size
                .fetch_sub(metadata.size_bytes, Ordering::SeqCst);
        }
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.total_size.store(0, Ordering::SeqCst);
    }

    /// Snapshot of all entries, for sweeps and persistence
    pub fn snapshot(&self) -> Vec<EntryMetadata> {
        self.entries.read().values().cloned().collect()
    }

    /// Keys of all entries expired at `now`
    pub fn expired_keys(&self, now: u64) -> Vec<CacheKey> {
        self.entries
            .read()
            .iter()
            .filter(|(_, meta)| meta.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Save the index to a JSON file, atomically (temp file + rename)
    pub async fn save_to_file(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot = IndexSnapshot {
            entries: self.snapshot(),
            version: 1,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    /// Load an index from a JSON file.
    ///
    /// A missing file yields an empty index; an unparseable one is
    /// discarded with a warning rather than failing startup.
    pub async fn load_from_file(path: &Path) -> Result<Self, CacheError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let snapshot: IndexSnapshot = match serde_json::from_slice(&data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse cache index, starting empty");
                return Ok(Self::new());
            }
        };

        let index = Self::new();
        for metadata in snapshot.entries {
            index.insert(metadata.cache_key.clone(), metadata);
        }
        Ok(index)
    }

    /// Reconcile the index with the entries directory.
    ///
    /// Repair is by deletion on either side: index entries without a blob
    /// are dropped, blobs without an index entry are deleted, expired
    /// entries lose both. Sizes are recomputed from the filesystem.
    pub async fn validate_and_repair(&self, entries_dir: &Path) -> Result<(), CacheError> {
        let mut fs_slots = HashSet::new();
        match tokio::fs::read_dir(entries_dir).await {
            Ok(mut dir) => {
                while let Some(entry) = dir.next_entry().await? {
                    let path = entry.path();
                    let is_tmp = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.ends_with(".tmp"))
                        .unwrap_or(false);
                    if is_tmp {
                        remove_slot(&path).await;
                    } else {
                        fs_slots.insert(path);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let now = epoch_now();
        let mut keys_to_remove = Vec::new();
        let mut referenced = HashSet::new();
        let mut new_total = 0u64;
        let snapshot = self.snapshot();

        for metadata in &snapshot {
            if metadata.is_expired(now) {
                keys_to_remove.push(metadata.cache_key.clone());
                remove_slot(&metadata.blob_path).await;
                continue;
            }
            if !fs_slots.contains(&metadata.blob_path) {
                keys_to_remove.push(metadata.cache_key.clone());
                continue;
            }
            referenced.insert(metadata.blob_path.clone());

            let actual_size = slot_size(&metadata.blob_path).await;
            new_total += actual_size;
            if actual_size != metadata.size_bytes {
                let mut updated = metadata.clone();
                updated.size_bytes = actual_size;
                self.entries
                    .write()
                    .insert(metadata.cache_key.clone(), updated);
            }
        }

        // Orphaned blobs: on disk but not referenced by any live entry
        for slot in &fs_slots {
            if !referenced.contains(slot) {
                remove_slot(slot).await;
            }
        }

        {
            let mut entries = self.entries.write();
            for key in &keys_to_remove {
                entries.remove(key);
            }
        }
        self.total_size.store(new_total, Ordering::SeqCst);

        Ok(())
    }
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete a slot (file or dataset directory), logging failures
async fn remove_slot(path: &Path) {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove cache slot");
    }
}

/// Serializable snapshot of the cache index
#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    entries: Vec<EntryMetadata>,
    version: u32,
}
