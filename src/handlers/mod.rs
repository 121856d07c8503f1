//! Format handler registry
//!
//! Handlers translate between decoded payloads and files on disk. The
//! store resolves a handler from an explicit format override, the file
//! extension, or (for writes) the payload type, in that order. Handlers
//! are pluggable: the registry ships with JSON, YAML, text, and raw-bytes
//! handlers and accepts custom registrations.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;

mod builtin;

pub use builtin::{BytesHandler, JsonHandler, TextHandler, YamlHandler};

/// A decoded value moving through the store
///
/// Tagged so write-side handler selection is an explicit type switch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A structured document (JSON or YAML source)
    Json(serde_json::Value),
    /// Plain text
    Text(String),
    /// Raw bytes
    Bytes(Bytes),
}

/// Encode/decode capability for one file format
pub trait FormatHandler: Send + Sync {
    /// Extensions this handler claims, lowercase, without dots
    fn extensions(&self) -> &[&str];

    /// Whether this handler can encode the given payload type
    fn handles_payload(&self, payload: &Payload) -> bool;

    /// Decode a single file
    fn read_from_file(&self, path: &Path) -> Result<Payload, StoreError>;

    /// Encode a payload into a file
    fn write_to_file(&self, payload: &Payload, path: &Path) -> Result<(), StoreError>;

    /// Decode a directory tree of part files into one payload
    fn read_dataset(&self, dir: &Path) -> Result<Payload, StoreError>;
}

/// Registry of format handlers, consulted by extension or payload type
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn FormatHandler>>,
}

impl HandlerRegistry {
    /// Empty registry with no handlers
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registry preloaded with the built-in handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonHandler));
        registry.register(Arc::new(YamlHandler));
        registry.register(Arc::new(TextHandler));
        registry.register(Arc::new(BytesHandler));
        registry
    }

    /// Register a handler; later registrations win on extension conflicts
    pub fn register(&mut self, handler: Arc<dyn FormatHandler>) {
        self.handlers.insert(0, handler);
    }

    /// Look up a handler by extension (with or without a leading dot)
    pub fn handler_for_extension(&self, ext: &str) -> Option<Arc<dyn FormatHandler>> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.handlers
            .iter()
            .find(|handler| handler.extensions().contains(&ext.as_str()))
            .cloned()
    }

    /// Look up a handler for a file path, honoring a format override
    pub fn handler_for_file(
        &self,
        path: &str,
        format_override: Option<&str>,
    ) -> Option<Arc<dyn FormatHandler>> {
        if let Some(format) = format_override {
            return self.handler_for_extension(format);
        }
        let ext = Path::new(path).extension()?.to_str()?;
        self.handler_for_extension(ext)
    }

    /// Look up a handler by payload type (write-side last resort)
    pub fn handler_for_payload(&self, payload: &Payload) -> Option<Arc<dyn FormatHandler>> {
        self.handlers
            .iter()
            .find(|handler| handler.handles_payload(payload))
            .cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
