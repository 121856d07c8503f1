// Backend options module
//
// Options are data-only and cloneable. Each backend kind has its own
// options struct sharing a common cache section; the `BackendOptions`
// enum makes backend selection an explicit type switch instead of
// attribute probing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Default cache TTL applied when no expiry is configured, in hours.
/// A configured value of 0 means "cache forever" and is always explicit.
pub const DEFAULT_CACHE_EXPIRY_HOURS: u64 = 24;

/// Shared cache section of every backend's options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOptions {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Cache directory; resolved to a per-user default when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// TTL in hours; Some(0) = never expire; None = unset (inherits)
    #[serde(default)]
    pub expiry_hours: Option<u64>,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: None,
            expiry_hours: None,
        }
    }
}

impl CacheOptions {
    /// TTL in hours with the crate-wide default applied for unset values
    pub fn effective_expiry_hours(&self) -> u64 {
        self.expiry_hours.unwrap_or(DEFAULT_CACHE_EXPIRY_HOURS)
    }

    /// Merge settings inherited from a shared cache service.
    ///
    /// The enable flag is forced on (a shared cache service only exists
    /// because caching was requested); directory and TTL are filled in only
    /// when not explicitly set on this options value.
    pub fn merge_shared(&mut self, dir: &Path, expiry_hours: u64) {
        self.enabled = true;
        if self.dir.is_none() {
            self.dir = Some(dir.to_path_buf());
        }
        if self.expiry_hours.is_none() {
            self.expiry_hours = Some(expiry_hours);
        }
    }
}

/// Options for the local filesystem backend
///
/// Caching defaults to off: source and cache destination live on the same
/// filesystem, so a copy buys nothing unless explicitly requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOptions {
    #[serde(default = "local_default_cache")]
    pub cache: CacheOptions,
}

fn local_default_cache() -> CacheOptions {
    CacheOptions {
        enabled: false,
        ..CacheOptions::default()
    }
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            cache: local_default_cache(),
        }
    }
}

/// Options for the S3-compatible object store backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Options {
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Path-style addressing, required by most S3-compatible stores
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub cache: CacheOptions,
}

/// Tagged per-backend configuration variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendOptions {
    Local(LocalOptions),
    S3(S3Options),
}

impl BackendOptions {
    /// Canonical scheme this options value applies to
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendOptions::Local(_) => "file",
            BackendOptions::S3(_) => "s3",
        }
    }

    /// Whether this options value applies to the given URI scheme.
    /// Bare relative paths parse to an empty scheme and are local.
    pub fn matches_scheme(&self, scheme: &str) -> bool {
        match self {
            BackendOptions::Local(_) => scheme.is_empty() || scheme == "file",
            BackendOptions::S3(_) => scheme == "s3",
        }
    }

    pub fn cache(&self) -> &CacheOptions {
        match self {
            BackendOptions::Local(opts) => &opts.cache,
            BackendOptions::S3(opts) => &opts.cache,
        }
    }

    pub fn cache_mut(&mut self) -> &mut CacheOptions {
        match self {
            BackendOptions::Local(opts) => &mut opts.cache,
            BackendOptions::S3(opts) => &mut opts.cache,
        }
    }

    /// Synthesize default options for a scheme
    pub fn default_for_scheme(scheme: &str) -> Result<Self, StoreError> {
        match scheme {
            "" | "file" => Ok(BackendOptions::Local(LocalOptions::default())),
            "s3" => Ok(BackendOptions::S3(S3Options::default())),
            other => Err(StoreError::Config(format!(
                "unsupported storage scheme: {}",
                other
            ))),
        }
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), StoreError> {
        if let BackendOptions::S3(opts) = self {
            if opts.access_key.is_some() != opts.secret_key.is_some() {
                return Err(StoreError::Config(
                    "S3 access_key and secret_key must be set together".to_string(),
                ));
            }
        }
        if self.cache().enabled {
            if let Some(dir) = &self.cache().dir {
                if dir.as_os_str().is_empty() {
                    return Err(StoreError::Config(
                        "cache dir cannot be empty when caching is enabled".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Registry mapping schemes to options, with a designated default slot.
///
/// Resolution order on lookup: exact scheme match, then the default entry.
/// Callers synthesize backend defaults when both miss.
#[derive(Debug, Clone, Default)]
pub struct OptionsRegistry {
    by_scheme: HashMap<String, BackendOptions>,
    default: Option<BackendOptions>,
}

impl OptionsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register options under their canonical scheme
    pub fn register(&mut self, options: BackendOptions) {
        self.by_scheme.insert(options.scheme().to_string(), options);
    }

    /// Register the fallback entry consulted when no scheme matches
    pub fn register_default(&mut self, options: BackendOptions) {
        self.default = Some(options);
    }

    /// Resolve options for a scheme: exact match wins, then the default entry
    pub fn resolve(&self, scheme: &str) -> Option<&BackendOptions> {
        let canonical = if scheme.is_empty() { "file" } else { scheme };
        self.by_scheme
            .get(canonical)
            .or(self.default.as_ref())
    }

    /// First registered options with caching enabled, else any entry.
    /// Used to construct a cache service when the primary options carry none.
    pub fn any_cache_enabled(&self) -> Option<&BackendOptions> {
        self.by_scheme
            .values()
            .chain(self.default.as_ref())
            .find(|opts| opts.cache().enabled)
            .or_else(|| self.by_scheme.values().chain(self.default.as_ref()).next())
    }

    pub fn is_empty(&self) -> bool {
        self.by_scheme.is_empty() && self.default.is_none()
    }
}

/// Pick the options for the primary backend out of a registered list.
///
/// First preference is an exact scheme match. Local primaries never fall
/// back to S3 options (credential leakage across backend kinds); remote
/// primaries fall back to the first entry.
pub fn select_primary_options(scheme: &str, list: &[BackendOptions]) -> Option<BackendOptions> {
    if let Some(opts) = list.iter().find(|opts| opts.matches_scheme(scheme)) {
        return Some(opts.clone());
    }
    if scheme.is_empty() || scheme == "file" {
        return None;
    }
    list.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_options_default_enabled() {
        let opts = CacheOptions::default();
        assert!(opts.enabled);
        assert_eq!(opts.dir, None);
        assert_eq!(opts.expiry_hours, None);
    }

    #[test]
    fn test_cache_options_effective_expiry_defaults() {
        let opts = CacheOptions::default();
        assert_eq!(opts.effective_expiry_hours(), DEFAULT_CACHE_EXPIRY_HOURS);
    }

    #[test]
    fn test_cache_options_zero_expiry_is_explicit_cache_forever() {
        let opts = CacheOptions {
            expiry_hours: Some(0),
            ..CacheOptions::default()
        };
        assert_eq!(opts.effective_expiry_hours(), 0);
    }

    #[test]
    fn test_merge_shared_fills_unset_fields_only() {
        let mut opts = CacheOptions {
            enabled: false,
            dir: None,
            expiry_hours: Some(2),
        };
        opts.merge_shared(&PathBuf::from("/shared/cache"), 48);
        assert!(opts.enabled);
        assert_eq!(opts.dir, Some(PathBuf::from("/shared/cache")));
        // explicitly-set TTL survives the merge
        assert_eq!(opts.expiry_hours, Some(2));
    }

    #[test]
    fn test_merge_shared_does_not_overwrite_explicit_dir() {
        let mut opts = CacheOptions {
            enabled: true,
            dir: Some(PathBuf::from("/mine")),
            expiry_hours: None,
        };
        opts.merge_shared(&PathBuf::from("/shared"), 48);
        assert_eq!(opts.dir, Some(PathBuf::from("/mine")));
        assert_eq!(opts.expiry_hours, Some(48));
    }

    #[test]
    fn test_local_options_cache_disabled_by_default() {
        let opts = LocalOptions::default();
        assert!(!opts.cache.enabled);
    }

    #[test]
    fn test_s3_options_cache_enabled_by_default() {
        let opts = S3Options::default();
        assert!(opts.cache.enabled);
    }

    #[test]
    fn test_backend_options_scheme() {
        assert_eq!(
            BackendOptions::Local(LocalOptions::default()).scheme(),
            "file"
        );
        assert_eq!(BackendOptions::S3(S3Options::default()).scheme(), "s3");
    }

    #[test]
    fn test_backend_options_matches_empty_scheme_as_local() {
        let local = BackendOptions::Local(LocalOptions::default());
        assert!(local.matches_scheme(""));
        assert!(local.matches_scheme("file"));
        assert!(!local.matches_scheme("s3"));
    }

    #[test]
    fn test_default_for_scheme() {
        assert!(matches!(
            BackendOptions::default_for_scheme("s3"),
            Ok(BackendOptions::S3(_))
        ));
        assert!(matches!(
            BackendOptions::default_for_scheme(""),
            Ok(BackendOptions::Local(_))
        ));
        assert!(BackendOptions::default_for_scheme("gopher").is_err());
    }

    #[test]
    fn test_validate_rejects_partial_s3_credentials() {
        let opts = BackendOptions::S3(S3Options {
            access_key: Some("AKIA".to_string()),
            ..S3Options::default()
        });
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_full_s3_credentials() {
        let opts = BackendOptions::S3(S3Options {
            access_key: Some("AKIA".to_string()),
            secret_key: Some("secret".to_string()),
            ..S3Options::default()
        });
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_registry_exact_scheme_match_wins() {
        let mut registry = OptionsRegistry::new();
        registry.register(BackendOptions::S3(S3Options {
            region: Some("us-west-2".to_string()),
            ..S3Options::default()
        }));
        registry.register_default(BackendOptions::Local(LocalOptions::default()));

        let resolved = registry.resolve("s3").unwrap();
        assert!(matches!(resolved, BackendOptions::S3(_)));
    }

    #[test]
    fn test_registry_falls_back_to_default_entry() {
        let mut registry = OptionsRegistry::new();
        registry.register_default(BackendOptions::S3(S3Options::default()));

        let resolved = registry.resolve("s3").unwrap();
        assert!(matches!(resolved, BackendOptions::S3(_)));
    }

    #[test]
    fn test_registry_returns_none_when_empty() {
        let registry = OptionsRegistry::new();
        assert!(registry.resolve("s3").is_none());
    }

    #[test]
    fn test_select_primary_options_exact_scheme() {
        let list = vec![
            BackendOptions::Local(LocalOptions::default()),
            BackendOptions::S3(S3Options::default()),
        ];
        let picked = select_primary_options("s3", &list).unwrap();
        assert!(matches!(picked, BackendOptions::S3(_)));
    }

    #[test]
    fn test_select_primary_options_local_never_uses_s3_options() {
        let list = vec![BackendOptions::S3(S3Options::default())];
        assert!(select_primary_options("", &list).is_none());
        assert!(select_primary_options("file", &list).is_none());
    }

    #[test]
    fn test_select_primary_options_remote_falls_back_to_first() {
        let list = vec![BackendOptions::Local(LocalOptions::default())];
        let picked = select_primary_options("s3", &list).unwrap();
        assert!(matches!(picked, BackendOptions::Local(_)));
    }

    #[test]
    fn test_backend_options_deserialize_from_yaml() {
        let yaml = r#"
backend: s3
region: eu-central-1
force_path_style: true
cache:
  enabled: true
  expiry_hours: 12
"#;
        let opts: BackendOptions = serde_yaml::from_str(yaml).unwrap();
        match &opts {
            BackendOptions::S3(s3) => {
                assert_eq!(s3.region.as_deref(), Some("eu-central-1"));
                assert!(s3.force_path_style);
                assert_eq!(s3.cache.expiry_hours, Some(12));
            }
            _ => panic!("expected s3 options"),
        }
    }
}
