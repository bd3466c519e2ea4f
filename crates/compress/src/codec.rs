//! In-memory encoding and decoding for every [`Compression`] format.

use crate::error::{ErrorKind, Result};
use crate::{Compression, Compressor};
use exn::ResultExt;
use std::io::{self, Cursor, Read, Write};
use tracing::instrument;

/// Bundles are written once and read on every cold start, so every format
/// runs at its strongest setting.
mod level {
    pub const BZIP2: u32 = 9;
    pub const GZIP: u32 = 9;
    #[cfg(feature = "xz")]
    pub const XZ: u32 = 9;
    #[cfg(feature = "zstd")]
    pub const ZSTD: i32 = 19;
    #[cfg(feature = "brotli")]
    pub const BROTLI: u32 = 11;
    #[cfg(feature = "brotli")]
    pub const BROTLI_WINDOW: u32 = 22;
    #[cfg(feature = "brotli")]
    pub const BROTLI_BUFFER: usize = 4096;
}

/// A compressing writer that has to be told when the input ends.
trait Encoder: Write {
    fn end(self: Box<Self>) -> io::Result<()>;
}

impl Encoder for &mut Vec<u8> {
    fn end(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Encoder for bzip2::write::BzEncoder<W> {
    fn end(self: Box<Self>) -> io::Result<()> {
        self.finish().map(drop)
    }
}

impl<W: Write> Encoder for flate2::write::GzEncoder<W> {
    fn end(self: Box<Self>) -> io::Result<()> {
        self.finish().map(drop)
    }
}

#[cfg(feature = "xz")]
impl<W: Write> Encoder for xz2::write::XzEncoder<W> {
    fn end(self: Box<Self>) -> io::Result<()> {
        self.finish().map(drop)
    }
}

#[cfg(feature = "zstd")]
impl<W: Write> Encoder for zstd::stream::write::Encoder<'_, W> {
    fn end(self: Box<Self>) -> io::Result<()> {
        self.finish().map(drop)
    }
}

/// Raw Snappy blocks carry their length up front, so the input is held
/// until [`end`](Encoder::end) and compressed in one go.
struct SnappyBlock<'a> {
    sink: &'a mut Vec<u8>,
    pending: Vec<u8>,
}

impl Write for SnappyBlock<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Encoder for SnappyBlock<'_> {
    fn end(mut self: Box<Self>) -> io::Result<()> {
        let block = snap::raw::Encoder::new().compress_vec(&self.pending).map_err(io::Error::other)?;
        self.sink.extend_from_slice(&block);
        Ok(())
    }
}

#[cfg(feature = "brotli")]
impl<W: Write> Encoder for brotli::CompressorWriter<W> {
    fn end(mut self: Box<Self>) -> io::Result<()> {
        self.flush()?;
        // Dropping the writer emits the final block.
        drop(self);
        Ok(())
    }
}

impl Compression {
    fn encoder<'a>(&self, sink: &'a mut Vec<u8>) -> Result<Box<dyn Encoder + 'a>> {
        Ok(match self {
            Compression::None => Box::new(sink),
            Compression::Bzip2 => Box::new(bzip2::write::BzEncoder::new(sink, bzip2::Compression::new(level::BZIP2))),
            Compression::Gzip => Box::new(flate2::write::GzEncoder::new(sink, flate2::Compression::new(level::GZIP))),
            Compression::Snappy => Box::new(SnappyBlock { sink, pending: Vec::new() }),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(xz2::write::XzEncoder::new(sink, level::XZ)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                Box::new(zstd::stream::write::Encoder::new(sink, level::ZSTD).or_raise(|| ErrorKind::CodecInit)?)
            }
            #[cfg(feature = "brotli")]
            Compression::Brotli => Box::new(brotli::CompressorWriter::new(
                sink,
                level::BROTLI_BUFFER,
                level::BROTLI,
                level::BROTLI_WINDOW,
            )),
        })
    }

    /// Wrap `source` so that reading from it yields decompressed bytes.
    ///
    /// [`FolderArchiver`](crate::FolderArchiver) streams tarballs through
    /// this instead of decompressing them into memory first.
    pub fn decoder<'a, R: Read + 'a>(&self, mut source: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(source),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(source)),
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(source)),
            // Raw blocks cannot be decoded incrementally.
            Compression::Snappy => {
                let mut block = Vec::new();
                source.read_to_end(&mut block).or_raise(|| ErrorKind::Io)?;
                let raw = snap::raw::Decoder::new().decompress_vec(&block).or_raise(|| ErrorKind::InvalidData)?;
                Box::new(Cursor::new(raw))
            }
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(source)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                Box::new(zstd::stream::read::Decoder::new(source).or_raise(|| ErrorKind::CodecInit)?)
            }
            #[cfg(feature = "brotli")]
            Compression::Brotli => Box::new(brotli::Decompressor::new(source, level::BROTLI_BUFFER)),
        })
    }
}

impl Compressor for Compression {
    /// ```
    /// use rvs_compress::{Compression, Compressor};
    ///
    /// let packed = Compression::Gzip.compress(b"the\nand\nof\n").unwrap();
    /// assert_eq!(Compression::Gzip.decompress(&packed).unwrap(), b"the\nand\nof\n");
    /// ```
    #[instrument(level = "debug", skip_all, fields(format = %self, input = input.len()))]
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut encoder = self.encoder(&mut output)?;
        encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
        encoder.end().or_raise(|| ErrorKind::Io)?;
        Ok(output)
    }

    #[instrument(level = "debug", skip_all, fields(format = %self, input = input.len()))]
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        if *self == Compression::None {
            return Ok(input.to_vec());
        }
        let mut output = Vec::with_capacity(input.len() * 2);
        self.decoder(input)?.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
        Ok(output)
    }
}
