//! Folder archiving.
//!
//! A folder blob is `compressor(mode(tar(folder)))`. The tarball keeps the
//! folder's own name as its single top-level entry, so unpacking into `dest`
//! recreates `dest/<folder name>/...`.

use crate::error::{ErrorKind, Result};
use crate::{Compression, Compressor};
use exn::{OptionExt, ResultExt};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Packs directory trees into single blobs and back.
///
/// The archive mode and the byte compressor are fixed at construction; a
/// blob can only be unpacked by an archiver configured the same way.
///
/// # Examples
///
/// ```no_run
/// use rvs_compress::{Compression, FolderArchiver};
///
/// # fn example() -> rvs_compress::error::Result<()> {
/// let archiver = FolderArchiver::new(Compression::None, Compression::Gzip);
/// let blob = archiver.compress_folder("/var/cache/rvs/stopwords/V2.0")?;
/// archiver.decompress_to_folder(&blob, "/tmp/restore/stopwords")?;
/// assert!(std::path::Path::new("/tmp/restore/stopwords/V2.0").is_dir());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FolderArchiver {
    compressor: Arc<dyn Compressor>,
    mode: Compression,
}

impl FolderArchiver {
    pub fn new(compressor: impl Compressor + 'static, mode: Compression) -> Self {
        Self { compressor: Arc::new(compressor), mode }
    }

    pub fn mode(&self) -> Compression {
        self.mode
    }

    /// Archive `folder` (and everything below it) into a single blob.
    ///
    /// Returns [`NotADirectory`](ErrorKind::NotADirectory) if `folder` does
    /// not exist, is not a directory, or has no final path component.
    #[instrument(skip(self), fields(mode = %self.mode, folder = %folder.as_ref().display()))]
    pub fn compress_folder(&self, folder: impl AsRef<Path>) -> Result<Vec<u8>> {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(folder.to_path_buf()));
        }
        let root_name = folder.file_name().ok_or_raise(|| ErrorKind::NotADirectory(folder.to_path_buf()))?;
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_dir_all(root_name, folder).or_raise(|| ErrorKind::Io)?;
        let tarball = builder.into_inner().or_raise(|| ErrorKind::Io)?;
        let archived = self.mode.compress(&tarball)?;
        let blob = self.compressor.compress(&archived)?;
        tracing::debug!(tar_size = tarball.len(), blob_size = blob.len(), "Folder archived");
        Ok(blob)
    }

    /// Unpack a blob produced by [`compress_folder`](Self::compress_folder)
    /// into `destination`, creating it if needed.
    ///
    /// Entries that would land outside `destination` are skipped by the tar
    /// extractor.
    #[instrument(skip(self, data, destination), fields(mode = %self.mode, blob_size = data.len(), destination = %destination.as_ref().display()))]
    pub fn decompress_to_folder(&self, data: &[u8], destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let archived = self.compressor.decompress(data)?;
        if !self.mode.matches(&archived) {
            tracing::warn!(
                detected = %Compression::sniff(&archived),
                "Archive header does not match configured mode"
            );
        }
        std::fs::create_dir_all(destination).or_raise(|| ErrorKind::Io)?;
        let reader = self.mode.decoder(Cursor::new(archived))?;
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_mtime(true);
        archive.unpack(destination).or_raise(|| ErrorKind::InvalidData)?;
        Ok(())
    }
}

impl Debug for FolderArchiver {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FolderArchiver").field("mode", &self.mode).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use std::path::PathBuf;

    fn write_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let files = vec![
            (PathBuf::from("stopwords.txt"), b"the\nand\nof\n".to_vec()),
            (PathBuf::from("lang/en.txt"), b"english".to_vec()),
            (PathBuf::from("lang/deep/nested/weights.bin"), (0u8..=255).collect()),
            (PathBuf::from("empty.txt"), Vec::new()),
        ];
        for (path, data) in &files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, data).unwrap();
        }
        files
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    #[case(Compression::Snappy)]
    #[cfg_attr(feature = "brotli", case(Compression::Brotli))]
    #[cfg_attr(feature = "xz", case(Compression::Xz))]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_round_trip(#[case] mode: Compression) {
        let source = tempfile::tempdir().unwrap();
        let folder = source.path().join("V2.0");
        let files = write_tree(&folder);
        fs::create_dir_all(folder.join("empty-dir")).unwrap();

        let archiver = FolderArchiver::new(Compression::None, mode);
        let blob = archiver.compress_folder(&folder).unwrap();

        let target = tempfile::tempdir().unwrap();
        archiver.decompress_to_folder(&blob, target.path()).unwrap();
        let restored = target.path().join("V2.0");
        for (path, data) in files {
            assert_eq!(fs::read(restored.join(&path)).unwrap(), data, "{}", path.display());
        }
        assert!(restored.join("empty-dir").is_dir());
    }

    #[test]
    fn test_byte_compressor_is_applied() {
        let source = tempfile::tempdir().unwrap();
        let folder = source.path().join("bundle");
        write_tree(&folder);

        let archiver = FolderArchiver::new(Compression::Bzip2, Compression::Gzip);
        let blob = archiver.compress_folder(&folder).unwrap();
        assert_eq!(Compression::sniff(&blob), Compression::Bzip2);

        let target = tempfile::tempdir().unwrap();
        archiver.decompress_to_folder(&blob, target.path().join("missing/parent")).unwrap();
        assert!(target.path().join("missing/parent/bundle/stopwords.txt").is_file());
    }

    /// `snappy.compress(gzip(tar))` of a `V1.0/` folder holding `en.txt`.
    const SNAPPY_GZIP_TAR: &[u8] = &[
        0x86, 0x01, 0xf0, 0x85, 0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xed, 0xd1,
        0x3b, 0x0e, 0x83, 0x30, 0x10, 0x45, 0xd1, 0xa9, 0xbd, 0x0a, 0xaf, 0x80, 0xd8, 0xe0, 0xcf, 0x4e,
        0xdc, 0x23, 0x41, 0x94, 0xca, 0x48, 0xc4, 0x91, 0xb2, 0xfc, 0x18, 0x4a, 0x94, 0x94, 0x46, 0x8a,
        0xb8, 0xa7, 0x79, 0xd3, 0x4d, 0x71, 0x93, 0xed, 0xcc, 0x4d, 0xda, 0x32, 0x55, 0xf4, 0x7e, 0xdf,
        0xea, 0xb8, 0x5f, 0xee, 0x30, 0x44, 0x2b, 0xda, 0xcb, 0x09, 0x5e, 0xcf, 0x32, 0xae, 0xf5, 0xa5,
        0x5c, 0x53, 0xda, 0xfa, 0xcf, 0xb9, 0x2b, 0xef, 0xd2, 0xb4, 0x7f, 0x70, 0xee, 0x77, 0x7f, 0x3b,
        0x1c, 0xfa, 0x47, 0xdf, 0x07, 0xd1, 0x86, 0xfe, 0xcd, 0x95, 0xc7, 0xac, 0xc6, 0x3c, 0xa9, 0xe5,
        0xae, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0x7f,
        0xf9, 0x00, 0x57, 0x2d, 0xb1, 0x1d, 0x00, 0x28, 0x00, 0x00,
    ];

    #[test]
    fn test_decodes_snappy_compressed_tarball() {
        let archiver = FolderArchiver::new(Compression::Snappy, Compression::Gzip);
        let target = tempfile::tempdir().unwrap();
        archiver.decompress_to_folder(SNAPPY_GZIP_TAR, target.path()).unwrap();
        assert_eq!(fs::read(target.path().join("V1.0/en.txt")).unwrap(), b"the\nand\nof\n");
    }

    #[test]
    fn test_snappy_compressor_round_trip() {
        let source = tempfile::tempdir().unwrap();
        let folder = source.path().join("V1.0");
        let files = write_tree(&folder);

        let archiver = FolderArchiver::new(Compression::Snappy, Compression::Gzip);
        let blob = archiver.compress_folder(&folder).unwrap();
        assert_ne!(Compression::sniff(&blob), Compression::Gzip);

        let target = tempfile::tempdir().unwrap();
        archiver.decompress_to_folder(&blob, target.path()).unwrap();
        for (path, data) in files {
            assert_eq!(fs::read(target.path().join("V1.0").join(&path)).unwrap(), data);
        }
    }

    #[test]
    fn test_not_a_directory() {
        let source = tempfile::tempdir().unwrap();
        let file = source.path().join("file.txt");
        fs::write(&file, b"data").unwrap();
        let archiver = FolderArchiver::new(Compression::None, Compression::Gzip);
        let err = archiver.compress_folder(&file).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
        let err = archiver.compress_folder(source.path().join("nope")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[test]
    fn test_mismatched_mode_fails() {
        let source = tempfile::tempdir().unwrap();
        let folder = source.path().join("bundle");
        write_tree(&folder);
        let blob = FolderArchiver::new(Compression::None, Compression::Gzip).compress_folder(&folder).unwrap();
        let target = tempfile::tempdir().unwrap();
        let err = FolderArchiver::new(Compression::None, Compression::Bzip2)
            .decompress_to_folder(&blob, target.path())
            .unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}
