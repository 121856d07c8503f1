// Error types module

use thiserror::Error;

use crate::cache::CacheError;

/// Centralized error type for store operations
///
/// Categorizes failures so callers can distinguish "no handler matched"
/// from "the backend is unreachable" from plain I/O problems. Backend
/// errors keep their original cause attached as a source.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No format handler matches the file extension, override, or payload type
    #[error("no format handler for {0}")]
    FormatNotSupported(String),

    /// The backend could not be reached at all (network, credentials, endpoint)
    #[error("backend unavailable for {uri}: {source}")]
    BackendUnavailable {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A download from a backend failed mid-operation
    #[error("download failed for {path}: {source}")]
    DownloadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An upload to a backend failed
    #[error("upload failed for {path}: {source}")]
    UploadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The requested object does not exist in the backend
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid URI, unsupported scheme, or bad option values
    #[error("configuration error: {0}")]
    Config(String),

    /// Cache index failure
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
