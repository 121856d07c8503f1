//! Utility functions for the cache layer

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Seed mixed into every cache slot hash
pub const DEFAULT_HASH_SEED: u64 = 123;

/// Current time as Unix epoch seconds
pub fn epoch_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Hash a cache key into a filesystem-safe slot name.
///
/// Pure and deterministic over its inputs: the seed is an explicit
/// parameter and there is no fallback path that depends on process state.
pub fn hash_key(seed: u64, backend_id: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(b":");
    hasher.update(backend_id.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Slot path for a cache entry: `<hash>.blob` for files, `<hash>.ds`
/// (a directory) for datasets.
pub fn slot_path(entries_dir: &Path, hash: &str, is_dataset: bool) -> PathBuf {
    let ext = if is_dataset { "ds" } else { "blob" };
    entries_dir.join(format!("{}.{}", hash, ext))
}

/// Size of a slot on disk: file length, or the recursive sum for a
/// dataset directory. Unreadable entries count as zero.
pub async fn slot_size(path: &Path) -> u64 {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return 0;
    };
    if metadata.is_file() {
        return metadata.len();
    }

    let mut total = 0u64;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}
