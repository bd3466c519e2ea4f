//! Format names and magic-byte sniffing.

use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Every name `rvs.json` may use, the canonical one first. Formats whose
/// feature is disabled still appear so that the error can say so.
const NAMES: &[(&str, &[&str])] = &[
    ("none", &["", "none", "raw"]),
    ("brotli", &["br", "brotli"]),
    ("bzip2", &["bz2", "bzip2"]),
    ("gzip", &["gz", "gzip"]),
    ("snappy", &["snappy", "sz"]),
    ("xz", &["xz", "lzma"]),
    ("zstd", &["zst", "zstd"]),
];

impl Compression {
    /// Every format compiled into this build.
    pub const ENABLED: &[Compression] = &[
        Compression::None,
        #[cfg(feature = "brotli")]
        Compression::Brotli,
        Compression::Bzip2,
        Compression::Gzip,
        Compression::Snappy,
        #[cfg(feature = "xz")]
        Compression::Xz,
        #[cfg(feature = "zstd")]
        Compression::Zstd,
    ];

    /// Canonical configuration name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            #[cfg(feature = "brotli")]
            Compression::Brotli => "brotli",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            #[cfg(feature = "xz")]
            Compression::Xz => "xz",
            #[cfg(feature = "zstd")]
            Compression::Zstd => "zstd",
        }
    }

    /// Leading bytes every stream of this format starts with.
    ///
    /// `None` for uncompressed data, and for Brotli and raw Snappy blocks,
    /// which have no signature.
    #[must_use]
    pub fn magic(&self) -> Option<&'static [u8]> {
        match self {
            Compression::Bzip2 => Some(b"BZh"),
            Compression::Gzip => Some(&[0x1F, 0x8B]),
            #[cfg(feature = "xz")]
            Compression::Xz => Some(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Some(&[0x28, 0xB5, 0x2F, 0xFD]),
            _ => None,
        }
    }

    /// Guess the format of `bytes` from its signature, falling back to
    /// [`None`](Self::None).
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.magic().is_some_and(|magic| bytes.starts_with(magic)))
            .unwrap_or(Compression::None)
    }

    /// Whether `bytes` could have been produced by this format.
    ///
    /// Uncompressed data matches anything that no other format claims;
    /// Brotli and Snappy accept everything.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        match (self, self.magic()) {
            (_, Some(magic)) => bytes.starts_with(magic),
            (Compression::None, None) => Self::sniff(bytes) == Compression::None,
            (_, None) => true,
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = Error;

    /// Case-insensitive; accepts the short tar-style names too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let Some((canonical, _)) = NAMES.iter().find(|(_, aliases)| aliases.contains(&wanted.as_str())) else {
            exn::bail!(ErrorKind::UnsupportedFormat(s.to_string()));
        };
        match Self::ENABLED.iter().find(|format| format.as_str() == *canonical) {
            Some(format) => Ok(*format),
            None => exn::bail!(ErrorKind::FeatureDisabled(*canonical)),
        }
    }
}
