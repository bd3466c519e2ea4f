//! Resource Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A resource error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for resource operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Operational Errors
/// - [`ErrorKind::InvalidSpec`]
/// - [`ErrorKind::ResourceUnavailable`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Archive`]
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Config`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Resource name or version cannot be used as a path component.
    #[display("invalid resource identity: {_0}")]
    InvalidSpec(#[error(not(source))] String),
    /// Not present locally and could not be fetched from remote storage.
    #[display("resource unavailable: {_0}")]
    ResourceUnavailable(#[error(not(source))] String),
    /// Packing or unpacking the resource folder failed.
    #[display("resource archive error")]
    Archive,
    /// Remote storage rejected the upload.
    #[display("resource storage error")]
    Storage,
    /// The storage backend or archiver could not be built from configuration.
    #[display("resource configuration error")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// A failed fetch leaves the resource unloaded, so calling
    /// [`load`](crate::ResourceCache::load) again is always safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ResourceUnavailable(_) | ErrorKind::Storage)
    }
}
