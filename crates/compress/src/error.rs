//! Error types for compressors and the folder archiver.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The codec library refused to set up a stream.
    #[display("codec could not be initialised")]
    CodecInit,
    /// Input is truncated, corrupt or in another format. Retrying with the
    /// same bytes will fail the same way.
    #[display("invalid or corrupted data")]
    InvalidData,
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The format is known but this build was compiled without it.
    #[display("format {_0} needs its cargo feature enabled")]
    FeatureDisabled(#[error(not(source))] &'static str),
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Writing a stream or touching the filesystem failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        *self == ErrorKind::Io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn test_messages() {
        assert_eq!(ErrorKind::UnsupportedFormat("lz4".into()).to_string(), "unsupported format: lz4");
        assert_eq!(ErrorKind::FeatureDisabled("zstd").to_string(), "format zstd needs its cargo feature enabled");
        assert_eq!(
            ErrorKind::NotADirectory(PathBuf::from("stopwords/V2.0/words.txt")).to_string(),
            "not a directory: stopwords/V2.0/words.txt"
        );
    }

    #[test]
    fn test_only_io_is_retryable() {
        assert!(ErrorKind::Io.is_retryable());
        assert!(!ErrorKind::InvalidData.is_retryable());
        assert!(!ErrorKind::CodecInit.is_retryable());
    }

    #[test]
    fn test_raise_from_io() {
        let truncated: std::io::Result<()> = Err(std::io::ErrorKind::UnexpectedEof.into());
        let err = truncated.or_raise(|| ErrorKind::InvalidData).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}
