//! S3-compatible storage backend.
//!
//! Works against AWS S3 and the usual S3-compatible services (Backblaze B2,
//! MinIO, Tigris, GCS interoperability mode, ...).
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the storage configuration. Each
//! backend specifies its own `key_id` and `key_secret`.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, path::to_key};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use exn::ResultExt;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// In-flight request cap when the configuration does not set one.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Configuration map accepted by the `s3` / `object-store` backend tag.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default = "default_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_concurrent_requests() -> usize {
    DEFAULT_CONCURRENT_REQUESTS
}

/// Blobs as objects in one bucket, optionally under a key prefix.
///
/// Stores blobs in a bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use rvs_storage::backend::{S3Backend, S3Config};
///
/// # fn example() -> rvs_storage::error::Result<()> {
/// let backend = S3Backend::new("archive", S3Config {
///     bucket: "rvs-resources".to_string(),
///     prefix: Some("prod/".to_string()),
///     region: "us-west-004".to_string(),
///     endpoint: Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     key_id: "access_key_id".to_string(),
///     key_secret: "secret_access_key".to_string(),
///     max_concurrent_requests: 32,
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    pub fn new(name: impl Into<String>, config: S3Config) -> Result<Self> {
        let prefix = config.prefix.as_deref().map(to_key).transpose()?;
        let credentials = Credentials::new(config.key_id, config.key_secret, None, None, "rvs-config");
        let mut sdk = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region))
            // 1 initial attempt + 3 retries with exponential backoff.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint_url) = config.endpoint {
            sdk = sdk.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(sdk.build()),
            bucket: config.bucket,
            prefix,
            rate_limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
        })
    }

    /// Object key for a root-relative path, prefix included.
    fn object_key(&self, path: &Path) -> Result<String> {
        let key = to_key(path)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        })
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::Service("S3 rate limiter closed".to_string()))
    }

    fn network_error<E: std::error::Error>(err: &E) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.object_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => exn::bail!(Self::network_error(&err)),
        }
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.object_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            }
            Err(err) => exn::bail!(Self::network_error(&err)),
        };
        let body = output.body.collect().await.map_err(|err| Self::network_error(&err))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let key = self.object_key(path)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| Self::network_error(&err))?;
        tracing::debug!(backend = %self.name, key, bytes = data.len(), "Object written");
        Ok(true)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        // DeleteObject succeeds for missing keys; check first to keep the
        // NotFound contract.
        if !self.exists(path).await? {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let key = self.object_key(path)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| Self::network_error(&err))?;
        Ok(())
    }
}
