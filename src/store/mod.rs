//! Store façade
//!
//! `AutoStore` resolves logical keys to backends, moves bytes through the
//! cache, and hands local files to format handlers. Keys are either
//! relative paths against the primary backend or full URIs routed through
//! a lazily-populated backend registry (one instance per scheme + host
//! base, reused for connection and cache-directory sharing).
//!
//! # Example
//!
//! ```no_run
//! use autostore::{AutoStore, Payload};
//!
//! # async fn example() -> Result<(), autostore::StoreError> {
//! let store = AutoStore::open("s3://my-bucket/data").await?;
//! store
//!     .write("reports/summary.json", &Payload::Json(serde_json::json!({"x": 1})))
//!     .await?;
//! let value = store.read("reports/summary.json").await?;
//! store.close().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{create_backend, StorageBackend};
use crate::cache::CacheService;
use crate::config::{select_primary_options, BackendOptions, OptionsRegistry};
use crate::error::StoreError;
use crate::handlers::{HandlerRegistry, Payload};
use crate::uri::ParsedKey;

/// Cache-aware, multi-backend object store
pub struct AutoStore {
    storage_uri: String,
    primary: Arc<dyn StorageBackend>,
    cache: Option<Arc<CacheService>>,
    handlers: HandlerRegistry,
    options_registry: OptionsRegistry,
    /// Lazily-created backends for cross-backend URIs, keyed by
    /// `scheme://host`; entries are never evicted, only closed
    secondary: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl AutoStore {
    /// Open a store with default options for the URI's scheme
    pub async fn open(storage_uri: &str) -> Result<Self, StoreError> {
        Self::open_with_options(storage_uri, Vec::new()).await
    }

    /// Open a store with explicit options.
    ///
    /// - empty vector: defaults synthesized from the URI scheme
    /// - one entry: used for the primary backend
    /// - several entries: registered by scheme for cross-backend access;
    ///   the primary picks its match by scheme
    pub async fn open_with_options(
        storage_uri: &str,
        options: Vec<BackendOptions>,
    ) -> Result<Self, StoreError> {
        let parsed = ParsedKey::parse(storage_uri);
        let scheme = parsed.scheme.clone().unwrap_or_default();

        let mut options_registry = OptionsRegistry::new();
        if options.len() > 1 {
            for opts in &options {
                options_registry.register(opts.clone());
            }
        }

        let primary_options = match options.len() {
            0 => None,
            1 => Some(options[0].clone()),
            _ => select_primary_options(&scheme, &options),
        };
        let primary_options = match primary_options {
            Some(opts) => opts,
            None => BackendOptions::default_for_scheme(&scheme)?,
        };
        primary_options.validate()?;

        // A cache service exists when the primary enables caching, or any
        // registered options do; every cache-enabled backend shares it.
        let cache_source = if primary_options.cache().enabled {
            Some(primary_options.clone())
        } else {
            options_registry
                .any_cache_enabled()
                .filter(|opts| opts.cache().enabled)
                .cloned()
        };
        let cache = match cache_source {
            Some(opts) => {
                let cache_opts = opts.cache();
                let dir = cache_opts.dir.clone().unwrap_or_else(default_cache_dir);
                let service =
                    CacheService::open(dir, cache_opts.effective_expiry_hours()).await?;
                Some(Arc::new(service))
            }
            None => None,
        };

        let primary = create_backend(storage_uri, primary_options).await?;
        tracing::info!(uri = storage_uri, backend = primary.id(), "store opened");

        Ok(Self {
            storage_uri: storage_uri.to_string(),
            primary,
            cache,
            handlers: HandlerRegistry::with_defaults(),
            options_registry,
            secondary: RwLock::new(HashMap::new()),
        })
    }

    pub fn storage_uri(&self) -> &str {
        &self.storage_uri
    }

    /// The primary backend serving schemeless keys
    pub fn primary_backend(&self) -> Arc<dyn StorageBackend> {
        self.primary.clone()
    }

    /// Register additional format handlers
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Resolve the backend a key routes to, creating it on first use
    pub async fn backend_for_key(&self, key: &str) -> Result<Arc<dyn StorageBackend>, StoreError> {
        let parsed = ParsedKey::parse(key);
        self.resolve_backend(&parsed).await
    }

    async fn resolve_backend(
        &self,
        parsed: &ParsedKey,
    ) -> Result<Arc<dyn StorageBackend>, StoreError> {
        let Some(base_uri) = parsed.backend_uri() else {
            return Ok(self.primary.clone());
        };

        if let Some(existing) = self.secondary.read().get(&base_uri) {
            return Ok(existing.clone());
        }

        let scheme = parsed.scheme.clone().unwrap_or_default();
        let mut options = match self.options_registry.resolve(&scheme) {
            Some(opts) => opts.clone(),
            None => BackendOptions::default_for_scheme(&scheme)?,
        };
        if let Some(cache) = &self.cache {
            options
                .cache_mut()
                .merge_shared(cache.cache_dir(), cache.expiry_hours());
        }
        options.validate()?;

        let backend = create_backend(&base_uri, options).await?;

        // Insert-if-absent: when a concurrent request built the same
        // backend first, the duplicate is discarded, never promoted.
        let mut secondary = self.secondary.write();
        let entry = secondary.entry(base_uri).or_insert(backend);
        Ok(entry.clone())
    }

    /// Read and decode the object at `key`
    pub async fn read(&self, key: &str) -> Result<Payload, StoreError> {
        self.read_with(key, None, false).await
    }

    /// Read with an explicit format override and/or cache bypass.
    /// Query parameters on the key merge with the arguments.
    pub async fn read_with(
        &self,
        key: &str,
        format: Option<&str>,
        ignore_cache: bool,
    ) -> Result<Payload, StoreError> {
        let parsed = ParsedKey::parse(key);
        let format = format.map(str::to_string).or_else(|| parsed.format.clone());
        let ignore_cache = ignore_cache || parsed.ignore_cache;
        let path = non_empty_path(&parsed)?;
        let backend = self.resolve_backend(&parsed).await?;

        // Detection failures downgrade to single-file handling
        let dataset = match backend.is_dataset(&path).await {
            Ok(dataset) => dataset,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "dataset detection failed, treating as file");
                false
            }
        };

        let handler = self
            .handlers
            .handler_for_file(&path, format.as_deref())
            .ok_or_else(|| StoreError::FormatNotSupported(path.clone()))?;

        if let Some(cache) = self.cache_for(backend.as_ref()) {
            let local = if dataset {
                cache.fetch_dataset(backend.as_ref(), &path, ignore_cache).await?
            } else {
                cache.fetch(backend.as_ref(), &path, ignore_cache).await?
            };
            return if dataset {
                handler.read_dataset(&local)
            } else {
                handler.read_from_file(&local)
            };
        }

        // Uncached local objects decode in place, no copy
        if let Some(source) = backend.local_source(&path) {
            if !tokio::fs::try_exists(&source).await? {
                return Err(StoreError::NotFound(path));
            }
            return if dataset {
                handler.read_dataset(&source)
            } else {
                handler.read_from_file(&source)
            };
        }

        // Uncached remote read: scratch directory, removed on every exit path
        let scratch = tempfile::Builder::new()
            .prefix("autostore-read-")
            .tempdir()?;
        let result = if dataset {
            let dest = scratch.path().join("dataset");
            tokio::fs::create_dir_all(&dest).await?;
            backend.download_dataset(&path, &dest).await?;
            handler.read_dataset(&dest)
        } else {
            let dest = scratch.path().join("object");
            backend.download(&path, &dest).await?;
            handler.read_from_file(&dest)
        };
        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "failed to remove scratch directory");
        }
        result
    }

    /// Encode and store a payload at `key`
    pub async fn write(&self, key: &str, payload: &Payload) -> Result<(), StoreError> {
        self.write_with(key, payload, None).await
    }

    /// Write with an explicit format override.
    ///
    /// Handler selection: explicit override, then file extension, then
    /// the payload type.
    pub async fn write_with(
        &self,
        key: &str,
        payload: &Payload,
        format: Option<&str>,
    ) -> Result<(), StoreError> {
        let parsed = ParsedKey::parse(key);
        let format = format.map(str::to_string).or_else(|| parsed.format.clone());
        let path = non_empty_path(&parsed)?;
        let backend = self.resolve_backend(&parsed).await?;

        let handler = self
            .handlers
            .handler_for_file(&path, format.as_deref())
            .or_else(|| self.handlers.handler_for_payload(payload))
            .ok_or_else(|| StoreError::FormatNotSupported(path.clone()))?;

        let extension = format
            .or_else(|| {
                Path::new(&path)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(str::to_string)
            })
            .or_else(|| handler.extensions().first().map(|ext| ext.to_string()))
            .unwrap_or_else(|| "bin".to_string());

        // Staging directory scoped to this write; removed on every exit path
        let staging = tempfile::Builder::new()
            .prefix("autostore-upload-")
            .tempdir()?;
        let staged = staging.path().join(format!("upload.{}", extension));
        handler.write_to_file(payload, &staged)?;
        backend.upload(&staged, &path).await?;

        if let Err(e) = staging.close() {
            tracing::warn!(error = %e, "failed to remove staging directory");
        }
        Ok(())
    }

    /// Whether an object exists at `key`; bypasses the cache entirely
    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let parsed = ParsedKey::parse(key);
        let path = non_empty_path(&parsed)?;
        let backend = self.resolve_backend(&parsed).await?;
        backend.exists(&path).await
    }

    /// Membership test, mirroring `exists`
    pub async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.exists(key).await
    }

    /// Delete the object at `key`; bypasses the cache entirely
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let parsed = ParsedKey::parse(key);
        let path = non_empty_path(&parsed)?;
        let backend = self.resolve_backend(&parsed).await?;
        backend.delete(&path).await
    }

    /// List files in the primary backend matching a glob pattern
    pub async fn list_files(
        &self,
        pattern: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StoreError> {
        self.primary.list(pattern, recursive).await
    }

    /// All keys in the primary backend
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.list_files("*", true).await
    }

    /// Drop the cached copy of `key`, forcing the next read to re-fetch.
    /// No-op when caching is off or the key was never cached.
    pub async fn invalidate_cache(&self, key: &str) -> Result<(), StoreError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let parsed = ParsedKey::parse(key);
        let path = non_empty_path(&parsed)?;
        let backend = self.resolve_backend(&parsed).await?;
        cache.invalidate(backend.id(), &path).await;
        Ok(())
    }

    /// Sweep expired cache entries; returns the count removed
    pub async fn cleanup_expired_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.sweep_expired().await,
            None => 0,
        }
    }

    /// Close every backend. The store is not usable afterwards.
    pub async fn close(&self) {
        self.primary.close().await;
        let backends: Vec<_> = self.secondary.read().values().cloned().collect();
        for backend in backends {
            backend.close().await;
        }
        tracing::debug!(uri = %self.storage_uri, "store closed");
    }

    fn cache_for(&self, backend: &dyn StorageBackend) -> Option<&Arc<CacheService>> {
        if backend.cache_options().enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }
}

fn non_empty_path(parsed: &ParsedKey) -> Result<String, StoreError> {
    if parsed.path.is_empty() {
        return Err(StoreError::Config("key has an empty path".to_string()));
    }
    Ok(parsed.path.clone())
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("autostore-cache")
}
