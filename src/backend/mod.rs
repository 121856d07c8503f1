//! Storage backend abstraction
//!
//! A `StorageBackend` translates relative paths (no scheme or host) into
//! operations against one physical store. One instance exists per
//! (scheme, host) pair for the lifetime of a store; the façade reuses it
//! across every relative path under that pair.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{BackendOptions, CacheOptions};
use crate::error::StoreError;
use crate::uri::ParsedKey;

pub mod local;
pub mod s3;

#[cfg(test)]
pub(crate) mod mock;

pub use local::LocalBackend;
pub use s3::S3Backend;

/// Capability set implemented per storage scheme
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend identity: scheme + host (+ base path), never credentials.
    /// Cache keys are namespaced by this value.
    fn id(&self) -> &str;

    /// URI scheme this backend serves
    fn scheme(&self) -> &str;

    /// Effective cache settings for objects served by this backend
    fn cache_options(&self) -> &CacheOptions;

    /// For backends whose objects are directly addressable on the local
    /// filesystem: the native path for a relative key. Lets the store
    /// skip download/copy entirely when caching is off.
    fn local_source(&self, _path: &str) -> Option<PathBuf> {
        None
    }

    /// Fetch a single object into `dest`. Partial files must not survive
    /// a failed download.
    async fn download(&self, path: &str, dest: &Path) -> Result<(), StoreError>;

    /// Fetch a dataset (directory tree) into `dest`, which already exists
    async fn download_dataset(&self, path: &str, dest: &Path) -> Result<(), StoreError>;

    /// Store a local file under the given relative path
    async fn upload(&self, local: &Path, path: &str) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// List relative paths matching a glob pattern
    async fn list(&self, pattern: &str, recursive: bool) -> Result<Vec<String>, StoreError>;

    /// Whether the path names a dataset (directory tree) rather than a
    /// single object. Callers treat an error as "not a dataset".
    async fn is_dataset(&self, path: &str) -> Result<bool, StoreError>;

    /// Release held resources; idempotent
    async fn close(&self) {}
}

/// Construct a backend for a base URI (`scheme://host`, or a bare local
/// path). Options of the wrong kind for the scheme are replaced by
/// synthesized defaults that keep the caller's cache settings.
pub async fn create_backend(
    base_uri: &str,
    options: BackendOptions,
) -> Result<Arc<dyn StorageBackend>, StoreError> {
    let parsed = ParsedKey::parse(base_uri);
    let scheme = parsed.scheme.clone().unwrap_or_default();
    let options = coerce_options(&scheme, options)?;
    options.validate()?;

    match options {
        BackendOptions::Local(opts) => Ok(Arc::new(LocalBackend::new(base_uri, opts)?)),
        BackendOptions::S3(opts) => Ok(Arc::new(S3Backend::connect(base_uri, opts).await?)),
    }
}

/// Keep options that match the scheme; otherwise synthesize defaults for
/// the scheme, carrying over the shared cache section.
fn coerce_options(scheme: &str, options: BackendOptions) -> Result<BackendOptions, StoreError> {
    if options.matches_scheme(scheme) {
        return Ok(options);
    }
    let mut synthesized = BackendOptions::default_for_scheme(scheme)?;
    *synthesized.cache_mut() = options.cache().clone();
    Ok(synthesized)
}

/// Compile a glob pattern (`*`, `?`) into an anchored regex
pub(crate) fn glob_to_regex(pattern: &str) -> Result<regex::Regex, StoreError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c if r"\.+()[]{}|^$".contains(c) => {
                expr.push('\\');
                expr.push(c);
            }
            c => expr.push(c),
        }
    }
    expr.push('$');
    regex::Regex::new(&expr)
        .map_err(|e| StoreError::Config(format!("invalid list pattern {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalOptions, S3Options};

    #[test]
    fn test_glob_matches_everything_by_default() {
        let re = glob_to_regex("*").unwrap();
        assert!(re.is_match("a.json"));
        assert!(re.is_match("deep/nested/file.yaml"));
    }

    #[test]
    fn test_glob_star_and_question_mark() {
        let re = glob_to_regex("data/*.json").unwrap();
        assert!(re.is_match("data/a.json"));
        assert!(!re.is_match("data/a.yaml"));

        let re = glob_to_regex("part-?.json").unwrap();
        assert!(re.is_match("part-0.json"));
        assert!(!re.is_match("part-10.json"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let re = glob_to_regex("a+b.json").unwrap();
        assert!(re.is_match("a+b.json"));
        assert!(!re.is_match("aab.json"));
    }

    #[test]
    fn test_coerce_options_keeps_matching_kind() {
        let opts = BackendOptions::S3(S3Options {
            region: Some("us-east-1".to_string()),
            ..S3Options::default()
        });
        let coerced = coerce_options("s3", opts).unwrap();
        match coerced {
            BackendOptions::S3(s3) => assert_eq!(s3.region.as_deref(), Some("us-east-1")),
            _ => panic!("expected s3 options"),
        }
    }

    #[test]
    fn test_coerce_options_synthesizes_but_keeps_cache_section() {
        let mut local = LocalOptions::default();
        local.cache.enabled = true;
        local.cache.expiry_hours = Some(6);

        let coerced = coerce_options("s3", BackendOptions::Local(local)).unwrap();
        match coerced {
            BackendOptions::S3(s3) => {
                assert!(s3.cache.enabled);
                assert_eq!(s3.cache.expiry_hours, Some(6));
            }
            _ => panic!("expected s3 options"),
        }
    }

    #[test]
    fn test_coerce_options_rejects_unknown_scheme() {
        let result = coerce_options("gopher", BackendOptions::Local(LocalOptions::default()));
        assert!(result.is_err());
    }
}
