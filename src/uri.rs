//! Logical key parsing
//!
//! A logical key is either a bare relative path (`reports/2024/summary.json`)
//! or a full URI (`s3://bucket/reports/summary.json`), optionally suffixed
//! with query-style parameters:
//!
//! - `?ignore_cache` - bypass the cache for this read
//! - `?format=<ext>` - override extension-based format detection
//!
//! Query parameters are stripped before the key is resolved to a backend.

/// A logical key parsed into its routing components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// URI scheme, lowercased (`s3`, `file`); None for bare relative paths
    pub scheme: Option<String>,
    /// URI authority (bucket or host); empty for bare paths and `file://` keys
    pub host: String,
    /// Relative path with any leading slashes stripped
    pub path: String,
    /// `?ignore_cache` flag was present
    pub ignore_cache: bool,
    /// `?format=<ext>` override, without a leading dot
    pub format: Option<String>,
}

impl ParsedKey {
    /// Parse a logical key into scheme, host, path, and query parameters.
    pub fn parse(key: &str) -> Self {
        let (raw, query) = match key.split_once('?') {
            Some((r, q)) => (r, Some(q)),
            None => (key, None),
        };

        let mut ignore_cache = false;
        let mut format = None;
        if let Some(query) = query {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("format", value)) if !value.is_empty() => {
                        format = Some(value.trim_start_matches('.').to_lowercase());
                    }
                    Some(("ignore_cache", value)) => {
                        ignore_cache = value != "false";
                    }
                    None if pair == "ignore_cache" => ignore_cache = true,
                    _ => {}
                }
            }
        }

        if let Some((scheme, rest)) = raw.split_once("://") {
            let (host, path) = match rest.split_once('/') {
                Some((host, path)) => (host, path),
                None => (rest, ""),
            };
            ParsedKey {
                scheme: Some(scheme.to_lowercase()),
                host: host.to_string(),
                path: path.trim_start_matches('/').to_string(),
                ignore_cache,
                format,
            }
        } else {
            ParsedKey {
                scheme: None,
                host: String::new(),
                path: raw.trim_start_matches('/').to_string(),
                ignore_cache,
                format,
            }
        }
    }

    /// True when the key carries an explicit scheme and must be routed
    /// through the backend registry rather than the primary backend.
    pub fn has_scheme(&self) -> bool {
        self.scheme.is_some()
    }

    /// Base URI for backend construction: `scheme://host`, no path component.
    pub fn backend_uri(&self) -> Option<String> {
        self.scheme
            .as_ref()
            .map(|scheme| format!("{}://{}", scheme, self.host))
    }
}
