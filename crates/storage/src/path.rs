//! Path validation.
//!
//! Storage paths are always relative to a backend root. Anything that would
//! resolve outside of it is rejected before a backend sees it.

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Validate and normalize a root-relative storage path.
///
/// `.` components, repeated separators and trailing slashes are dropped, and
/// `..` is resolved lexically as long as it never climbs above the root.
/// Null bytes and empty results are rejected.
///
/// # Returns
/// The normalized path, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use rvs_storage::validate_path;
///
/// assert!(validate_path("stopwords/V2.0").is_ok());
/// assert!(validate_path("raw_page/../raw_page/p1.png").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("raw_page/./old/..//p1.png/").unwrap(),
///     Path::new("raw_page/p1.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut kept: Vec<&OsStr> = Vec::new();
    for part in original.components() {
        match part {
            // Unix paths may carry NUL, which C syscalls would truncate at.
            Component::Normal(name) if name.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(name) => kept.push(name),
            Component::ParentDir => {
                kept.pop().ok_or_raise(invalid)?;
            }
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::CurDir | Component::RootDir => {}
        }
    }
    if kept.is_empty() {
        exn::bail!(invalid());
    }
    Ok(kept.iter().collect())
}

/// Validate a path and render it as a `/`-separated object key.
///
/// Remote stores (S3 keys, SSH command lines) need UTF-8, so non-UTF-8 paths
/// are rejected here rather than lossily converted.
pub(crate) fn to_key(path: impl AsRef<Path>) -> Result<String> {
    let validated = validate(path)?;
    let parts = validated
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
    Ok(parts.join("/"))
}
