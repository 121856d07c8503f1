//! Cache layer
//!
//! Maps (backend identity, relative path) pairs to locally cached blobs
//! with TTL-based expiry. The in-memory index is persisted as a JSON
//! snapshot next to the blobs and reconciled with the filesystem at
//! startup; index and filesystem must never diverge.

pub mod entry;
pub mod error;
pub mod index;
pub mod service;
pub mod utils;

pub use entry::{CacheKey, EntryMetadata};
pub use error::CacheError;
pub use index::CacheIndex;
pub use service::CacheService;
