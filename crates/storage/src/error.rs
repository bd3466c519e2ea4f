//! Errors raised by storage backends and the backend factory.

use derive_more::{Display, Error};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing is stored at this path. Callers that treat absence as a
    /// normal outcome should check [`is_not_found`](Self::is_not_found).
    #[display("no blob at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("access denied to {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("filesystem error: {_0}")]
    Io(IoError),
    /// The remote end could not be reached or dropped the connection.
    #[display("remote storage unreachable: {_0}")]
    Network(#[error(not(source))] String),
    /// Relative root, or a blob path that escapes the root.
    #[display("invalid storage path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The storage service answered with an error of its own.
    #[display("storage service error: {_0}")]
    Service(#[error(not(source))] String),
    /// Unknown type tag, or a backend whose cargo feature is off.
    #[display("unsupported storage backend: {_0}")]
    UnsupportedBackend(#[error(not(source))] String),
    #[display("invalid configuration for `{_0}` backend: {_1}")]
    InvalidConfig(#[error(not(source))] String, #[error(not(source))] String),
    #[display("could not start blocking runtime")]
    Runtime,
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Classify a filesystem error against the blob path it concerns.
    pub fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            IoErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Service(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(ErrorKind::UnsupportedBackend("ftp".to_string()).to_string(), "unsupported storage backend: ftp");
        assert_eq!(
            ErrorKind::InvalidConfig("local".to_string(), "missing field `root`".to_string()).to_string(),
            "invalid configuration for `local` backend: missing field `root`"
        );
        assert_eq!(ErrorKind::NotFound(PathBuf::from("raw_page/a.png")).to_string(), "no blob at raw_page/a.png");
    }

    #[test]
    fn test_from_io() {
        let path = Path::new("raw_page/a.png");
        assert!(ErrorKind::from_io(IoErrorKind::NotFound.into(), path).is_not_found());
        assert!(matches!(
            ErrorKind::from_io(IoErrorKind::PermissionDenied.into(), path),
            ErrorKind::PermissionDenied(p) if p == path
        ));
        assert!(ErrorKind::from_io(IoErrorKind::StorageFull.into(), path).is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Network("reset".to_string()).is_retryable());
        assert!(ErrorKind::Service("SlowDown".to_string()).is_retryable());
        assert!(!ErrorKind::NotFound(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::UnsupportedBackend("ftp".to_string()).is_retryable());
    }
}
