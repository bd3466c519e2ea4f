//! Collection Error Types

use derive_more::{Display, Error};

/// A collection error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The record's content format is not one the collection stores.
    #[display("unsupported content format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    #[display("metadata index error")]
    Metadata,
    #[display("content storage error")]
    Storage,
    #[display("configuration error")]
    Config,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
