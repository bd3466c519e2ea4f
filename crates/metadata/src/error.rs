//! Metadata Error Types

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The backend is busy, locked or timed out. Worth another attempt.
    #[display("metadata backend temporarily unavailable")]
    Transient,
    /// A transient failure outlived the retry budget.
    #[display("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[display("batch of {size} documents exceeds the backend limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    /// Serialization/deserialization error.
    #[display("invalid document data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Convert a `sqlx` error, keeping it as the child frame.
    ///
    /// `SQLITE_BUSY`, `SQLITE_LOCKED` (and their extended codes) and pool
    /// acquisition timeouts become [`Transient`](Self::Transient); everything
    /// else is a plain [`Database`](Self::Database) error.
    #[track_caller]
    pub fn sqlx(err: sqlx::Error) -> Error {
        let kind = if is_contention(&err) { Self::Transient } else { Self::Database };
        exn::Exn::from(err).raise(kind)
    }
}

fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517" | "773"))
        }
        _ => false,
    }
}
