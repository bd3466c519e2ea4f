//! Storage backend trait and implementations.
//!
//! This module defines the [`StorageBackend`] trait, a unified interface for
//! moving whole blobs to and from local filesystems, S3-compatible object
//! stores and remote hosts reachable over SSH.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;
#[cfg(feature = "ssh")]
mod ssh;

pub use self::local::{LocalBackend, LocalConfig};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Config};
#[cfg(feature = "ssh")]
pub use self::ssh::{SshBackend, SshConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for storage backends.
///
/// Blobs are read and written whole. All operations are asynchronous; wrap
/// a handle in [`BlockingBackend`](crate::BlockingBackend) to call them from
/// synchronous code.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use rvs_storage::{backend::StorageBackend, error::Result};
///
/// async fn copy_blob(from: &dyn StorageBackend, to: &dyn StorageBackend, path: &Path) -> Result<bool> {
///     let data = from.download(path).await?;
///     to.upload(path, &data).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Check if a blob exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Fetch a blob.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the blob
    /// does not exist.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use rvs_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let bundle = backend.download(Path::new("resources/stopwords/V2.0")).await?;
    /// println!("Fetched {} bytes", bundle.len());
    /// # Ok(())
    /// # }
    /// ```
    async fn download(&self, path: &Path) -> Result<Vec<u8>>;

    /// Store a blob, creating or overwriting it.
    ///
    /// Returns `true` when the bytes were persisted and `false` when the
    /// backend deliberately skipped the write (see [`ReadOnlyBackend`]).
    /// An empty `data` slice is a valid zero-length blob.
    ///
    /// # Notes
    /// - Implementations create intermediate directories as needed.
    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool>;

    /// Delete a blob.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the blob
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
