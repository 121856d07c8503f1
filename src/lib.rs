// AutoStore object store library

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod store;
pub mod uri;

pub use config::{BackendOptions, CacheOptions, LocalOptions, S3Options};
pub use error::StoreError;
pub use handlers::{FormatHandler, HandlerRegistry, Payload};
pub use store::AutoStore;
