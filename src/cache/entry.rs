//! Cache key and entry metadata types
//!
//! - `CacheKey`: unique identifier for a cached object (backend identity +
//!   normalized relative path)
//! - `EntryMetadata`: where the cached blob lives on disk and when it expires

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache key identifying one cached object
///
/// The backend identity is derived from scheme and host only, never from
/// credentials, so rotating keys does not orphan cache entries.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Backend identity, e.g. `s3://my-bucket`
    pub backend_id: String,
    /// Relative path within the backend, no leading slash
    pub path: String,
}

impl CacheKey {
    pub fn new(backend_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.backend_id, self.path)
    }
}

/// Metadata for a cached entry on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub cache_key: CacheKey,
    /// Cache slot: a file for single objects, a directory for datasets
    pub blob_path: PathBuf,
    pub is_dataset: bool,
    pub size_bytes: u64,
    /// Unix epoch seconds
    pub created_at: u64,
    /// Unix epoch seconds; 0 means the entry never expires
    pub expires_at: u64,
}

impl EntryMetadata {
    pub fn new(
        cache_key: CacheKey,
        blob_path: PathBuf,
        is_dataset: bool,
        size_bytes: u64,
        created_at: u64,
        expires_at: u64,
    ) -> Self {
        Self {
            cache_key,
            blob_path,
            is_dataset,
            size_bytes,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at > 0 && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_equality_and_hash() {
        use std::collections::HashMap;

        let key1 = CacheKey::new("s3://bucket", "a/b.json");
        let key2 = CacheKey::new("s3://bucket", "a/b.json");
        let key3 = CacheKey::new("s3://other", "a/b.json");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);

        let mut map: HashMap<CacheKey, u32> = HashMap::new();
        map.insert(key1.clone(), 7);
        assert_eq!(map.get(&key2), Some(&7));
    }

    #[test]
    fn test_cache_key_distinguishes_backends_with_same_path() {
        let key1 = CacheKey::new("s3://bucket-a", "data.json");
        let key2 = CacheKey::new("s3://bucket-b", "data.json");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new("s3://bucket", "a/b.json");
        assert_eq!(key.to_string(), "s3://bucket/a/b.json");
    }

    #[test]
    fn test_entry_metadata_expiry() {
        let meta = EntryMetadata::new(
            CacheKey::new("s3://bucket", "x"),
            PathBuf::from("/cache/entries/abc.blob"),
            false,
            10,
            1_000,
            2_000,
        );
        assert!(!meta.is_expired(1_999));
        assert!(meta.is_expired(2_000));
        assert!(meta.is_expired(3_000));
    }

    #[test]
    fn test_entry_metadata_zero_expiry_never_expires() {
        let meta = EntryMetadata::new(
            CacheKey::new("s3://bucket", "x"),
            PathBuf::from("/cache/entries/abc.blob"),
            false,
            10,
            1_000,
            0,
        );
        assert!(!meta.is_expired(u64::MAX));
    }

    #[test]
    fn test_entry_metadata_serializes_round_trip() {
        let meta = EntryMetadata::new(
            CacheKey::new("file:///data", "report.yaml"),
            PathBuf::from("/cache/entries/def.blob"),
            true,
            42,
            100,
            200,
        );
        let json = serde_json::to_string(&meta).unwrap();
        let back: EntryMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cache_key, meta.cache_key);
        assert_eq!(back.blob_path, meta.blob_path);
        assert!(back.is_dataset);
        assert_eq!(back.size_bytes, 42);
        assert_eq!(back.expires_at, 200);
    }
}
