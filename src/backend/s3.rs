//! S3-compatible object store backend
//!
//! One backend instance per bucket (plus optional base prefix for
//! primary stores rooted below the bucket). Downloads are single-shot;
//! the cache layer is responsible for atomically promoting a finished
//! temp file into a cache slot, so partial fetches never become visible.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;

use super::{glob_to_regex, StorageBackend};
use crate::config::{CacheOptions, S3Options};
use crate::error::StoreError;
use crate::uri::ParsedKey;

pub struct S3Backend {
    client: Client,
    bucket: String,
    /// Base prefix under the bucket; empty for cross-backend access
    prefix: String,
    id: String,
    options: S3Options,
}

impl S3Backend {
    /// Connect to a bucket described by `s3://bucket[/base/prefix]`
    pub async fn connect(base_uri: &str, options: S3Options) -> Result<Self, StoreError> {
        let parsed = ParsedKey::parse(base_uri);
        if parsed.scheme.as_deref() != Some("s3") {
            return Err(StoreError::Config(format!(
                "S3 backend requires an s3:// URI, got {}",
                base_uri
            )));
        }
        if parsed.host.is_empty() {
            return Err(StoreError::Config(format!(
                "S3 URI must include a bucket: {}",
                base_uri
            )));
        }

        let bucket = parsed.host.clone();
        let prefix = parsed.path.trim_matches('/').to_string();
        let id = if prefix.is_empty() {
            format!("s3://{}", bucket)
        } else {
            format!("s3://{}/{}", bucket, prefix)
        };

        let client = build_client(&options).await;
        Ok(Self {
            client,
            bucket,
            prefix,
            id,
            options,
        })
    }

    /// Bucket-absolute key for a relative path
    fn full_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    /// Strip the base prefix back off a listed key
    fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return key;
        }
        key.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}

async fn build_client(options: &S3Options) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = options.region.clone() {
        loader = loader.region(Region::new(region));
    }
    if let (Some(access_key), Some(secret_key)) = (&options.access_key, &options.secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "autostore",
        ));
    }
    let shared = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared);
    if let Some(endpoint) = &options.endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }
    if options.force_path_style {
        builder = builder.force_path_style(true);
    }
    Client::from_conf(builder.build())
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn id(&self) -> &str {
        &self.id
    }

    fn scheme(&self) -> &str {
        "s3"
    }

    fn cache_options(&self) -> &CacheOptions {
        &self.options.cache
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        let key = self.full_key(path);
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_no_such_key() => {
                return Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => {
                return Err(StoreError::DownloadFailed {
                    path: path.to_string(),
                    source: Box::new(e),
                })
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })?;
        tokio::fs::write(dest, data.into_bytes()).await?;
        Ok(())
    }

    async fn download_dataset(&self, path: &str, dest: &Path) -> Result<(), StoreError> {
        let base = format!("{}/", self.full_key(path).trim_end_matches('/'));
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&base)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::DownloadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        if keys.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }

        for key in keys {
            let Some(part) = key.strip_prefix(&base) else {
                continue;
            };
            if part.is_empty() {
                continue;
            }
            let target = dest.join(part);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| StoreError::DownloadFailed {
                    path: path.to_string(),
                    source: Box::new(e),
                })?;
            let data = response
                .body
                .collect()
                .await
                .map_err(|e| StoreError::DownloadFailed {
                    path: path.to_string(),
                    source: Box::new(e),
                })?;
            tokio::fs::write(&target, data.into_bytes()).await?;
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, path: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| StoreError::UploadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::UploadFailed {
                path: path.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_not_found() => Ok(false),
            Err(e) => Err(StoreError::BackendUnavailable {
                uri: self.id.clone(),
                source: Box::new(e),
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if !self.exists(path).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| StoreError::BackendUnavailable {
                uri: self.id.clone(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    async fn list(&self, pattern: &str, recursive: bool) -> Result<Vec<String>, StoreError> {
        let matcher = glob_to_regex(pattern)?;
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(if self.prefix.is_empty() {
                String::new()
            } else {
                format!("{}/", self.prefix)
            });
        if !recursive {
            request = request.delimiter("/");
        }

        let mut pages = request.into_paginator().send();
        let mut found = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::BackendUnavailable {
                uri: self.id.clone(),
                source: Box::new(e),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    let relative = self.relative_key(key);
                    if !relative.is_empty() && matcher.is_match(relative) {
                        found.push(relative.to_string());
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn is_dataset(&self, path: &str) -> Result<bool, StoreError> {
        // An object at the exact key wins over a same-named prefix
        if self.exists(path).await? {
            return Ok(false);
        }
        let base = format!("{}/", self.full_key(path).trim_end_matches('/'));
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&base)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| StoreError::BackendUnavailable {
                uri: self.id.clone(),
                source: Box::new(e),
            })?;
        Ok(response.key_count().unwrap_or(0) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> S3Options {
        S3Options {
            region: Some("us-east-1".to_string()),
            access_key: Some("test-access".to_string()),
            secret_key: Some("test-secret".to_string()),
            ..S3Options::default()
        }
    }

    #[tokio::test]
    async fn test_connect_parses_bucket() {
        let backend = S3Backend::connect("s3://my-bucket", options()).await.unwrap();
        assert_eq!(backend.bucket, "my-bucket");
        assert_eq!(backend.prefix, "");
        assert_eq!(backend.id(), "s3://my-bucket");
    }

    #[tokio::test]
    async fn test_connect_parses_base_prefix() {
        let backend = S3Backend::connect("s3://my-bucket/data/v2", options())
            .await
            .unwrap();
        assert_eq!(backend.prefix, "data/v2");
        assert_eq!(backend.id(), "s3://my-bucket/data/v2");
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_bucket() {
        assert!(S3Backend::connect("s3://", options()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_non_s3_uri() {
        assert!(S3Backend::connect("file:///tmp", options()).await.is_err());
    }

    #[tokio::test]
    async fn test_full_key_applies_prefix() {
        let backend = S3Backend::connect("s3://bucket/base", options())
            .await
            .unwrap();
        assert_eq!(backend.full_key("a/b.json"), "base/a/b.json");
        assert_eq!(backend.full_key(""), "base");

        let bare = S3Backend::connect("s3://bucket", options()).await.unwrap();
        assert_eq!(bare.full_key("a/b.json"), "a/b.json");
    }

    #[tokio::test]
    async fn test_relative_key_strips_prefix() {
        let backend = S3Backend::connect("s3://bucket/base", options())
            .await
            .unwrap();
        assert_eq!(backend.relative_key("base/a/b.json"), "a/b.json");
        assert_eq!(backend.relative_key("unrelated/c.json"), "unrelated/c.json");
    }

    #[tokio::test]
    async fn test_identity_excludes_credentials() {
        let backend = S3Backend::connect("s3://bucket", options()).await.unwrap();
        assert!(!backend.id().contains("test-access"));
        assert!(!backend.id().contains("test-secret"));
    }
}
