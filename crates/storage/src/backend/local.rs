//! Blobs as plain files under a root directory.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Configuration map accepted by the `local` / `local-filesystem` backend tag.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Absolute directory that all paths are relative to.
    pub root: PathBuf,
}

/// Suffix counter for in-flight uploads, so two writers never share a
/// temporary file.
static STAGING: AtomicU64 = AtomicU64::new(0);

/// Filesystem backend rooted at an absolute directory.
///
/// Uploads are staged next to their target and renamed into place, so a
/// concurrent reader sees either the old blob or the new one.
///
/// ```no_run
/// use rvs_storage::backend::LocalBackend;
///
/// # fn example() -> rvs_storage::error::Result<()> {
/// let shared = LocalBackend::new("shared", "/mnt/shared/rvs")?;
/// assert_eq!(shared.root(), std::path::Path::new("/mnt/shared/rvs"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Open (and if necessary create) the directory at `root`.
    ///
    /// Fails with [`InvalidPath`](ErrorKind::InvalidPath) for relative roots
    /// and for roots that exist but are not directories.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let usable = root.is_absolute() && (root.is_dir() || !root.exists());
        if !usable {
            exn::bail!(ErrorKind::InvalidPath(root.to_path_buf()));
        }
        // Blocking, but only once per backend.
        std::fs::create_dir_all(root).map_err(|err| ErrorKind::from_io(err, root))?;
        Ok(Self { name: name.into(), root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await.map_err(|err| ErrorKind::from_io(err, path))?)
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        Ok(fs::read(&target).await.map_err(|err| ErrorKind::from_io(err, path))?)
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let target = self.resolve(path)?;
        let fail = |err| ErrorKind::from_io(err, path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(fail)?;
        }
        let mut staged = target.clone().into_os_string();
        staged.push(format!(".{}.{}.partial", std::process::id(), STAGING.fetch_add(1, Ordering::Relaxed)));
        let staged = PathBuf::from(staged);
        if let Err(err) = fs::write(&staged, data).await {
            _ = fs::remove_file(&staged).await;
            exn::bail!(fail(err));
        }
        fs::rename(&staged, &target).await.map_err(fail)?;
        tracing::debug!(backend = %self.name, path = %path.display(), bytes = data.len(), "Blob written");
        Ok(true)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let target = self.resolve(path)?;
        Ok(fs::remove_file(&target).await.map_err(|err| ErrorKind::from_io(err, path))?)
    }
}
