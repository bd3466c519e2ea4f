//! Read-through wrapper that never writes.

use crate::{BackendHandle, StorageBackend, error::Result};
use async_trait::async_trait;
use std::path::Path;

/// Lets a process read shared storage without ever modifying it.
///
/// Uploads report `false` and deletes succeed without touching the wrapped
/// backend, so callers keep working and can tell that nothing was stored.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}

impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &BackendHandle {
        &self.inner
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.download(path).await
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        tracing::info!(backend = self.name(), path = %path.display(), bytes = data.len(), "Read-only, upload skipped");
        Ok(false)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(backend = self.name(), path = %path.display(), "Read-only, delete skipped");
        Ok(())
    }
}
