//! Reversible byte transforms and folder archiving.
//!
//! Two layers live here:
//!
//! - [`Compressor`]: the byte-in, byte-out contract. Every [`Compression`]
//!   format implements it, and anything else that can losslessly round-trip
//!   a byte slice can be plugged in alongside.
//! - [`FolderArchiver`]: packs a directory tree into a single blob (tar, then
//!   the configured archive [`Compression`], then a [`Compressor`]) and
//!   unpacks it again. Resource bundles travel between the local cache and
//!   remote storage in this shape.
//!
//! Bzip2, Gzip and Snappy are always available. XZ is enabled by default; Brotli and
//! Zstd are behind feature flags.

mod archive;
mod codec;
pub mod error;
mod format;
#[cfg(feature = "serde")]
mod named;

pub use crate::archive::FolderArchiver;

/// A supported compression format.
///
/// Variants gated behind feature flags (`brotli`, `xz`, `zstd`) are only
/// available when the corresponding feature is enabled. Defaults to
/// [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Brotli compression
    #[cfg(feature = "brotli")]
    Brotli,
    /// Bzip2 compression
    Bzip2,
    /// Gzip compression
    Gzip,
    /// Snappy raw block format, as written by `snappy.compress`
    Snappy,
    /// XZ/LZMA compression
    #[cfg(feature = "xz")]
    Xz,
    /// Zstd compression
    #[cfg(feature = "zstd")]
    Zstd,
}

/// Reversible byte transform.
///
/// Implementations must satisfy `decompress(compress(x)) == x` for every
/// byte sequence `x`, including the empty one.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &[u8]) -> error::Result<Vec<u8>>;

    fn decompress(&self, input: &[u8]) -> error::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use crate::{Compression, Compressor};

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }

    #[test]
    fn compressor_is_object_safe() {
        let boxed: Box<dyn Compressor> = Box::new(Compression::Gzip);
        let packed = boxed.compress(b"page").unwrap();
        assert_eq!(boxed.decompress(&packed).unwrap(), b"page");
    }
}
