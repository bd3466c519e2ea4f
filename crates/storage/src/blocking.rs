use crate::BackendHandle;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// Synchronous view of a [`StorageBackend`](crate::StorageBackend).
///
/// Owns a current-thread runtime and blocks on each call. Must not be used
/// from inside an async context; use the async handle there, or move the
/// call into [`spawn_blocking`](tokio::task::spawn_blocking).
///
/// # Examples
///
/// ```no_run
/// use rvs_storage::{BackendFactory, BlockingBackend};
/// use serde_json::json;
/// use std::path::Path;
///
/// # fn example() -> rvs_storage::error::Result<()> {
/// let config = json!({ "root": "/mnt/shared/rvs" });
/// let backend = BlockingBackend::new(BackendFactory::build("local", config.as_object().unwrap())?)?;
/// let bundle = backend.download(Path::new("stopwords/V2.0"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlockingBackend {
    inner: BackendHandle,
    runtime: Arc<Runtime>,
}

impl BlockingBackend {
    pub fn new(inner: BackendHandle) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().or_raise(|| ErrorKind::Runtime)?;
        Ok(Self { inner, runtime: Arc::new(runtime) })
    }

    /// The wrapped async handle.
    pub fn handle(&self) -> &BackendHandle {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn exists(&self, path: &Path) -> Result<bool> {
        self.runtime.block_on(self.inner.exists(path))
    }

    pub fn download(&self, path: &Path) -> Result<Vec<u8>> {
        self.runtime.block_on(self.inner.download(path))
    }

    pub fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        self.runtime.block_on(self.inner.upload(path, data))
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        self.runtime.block_on(self.inner.delete(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[test]
    fn test_blocking_round_trip() {
        let mock = Arc::new(MockBackend::default());
        let backend = BlockingBackend::new(mock.clone()).unwrap();
        assert!(backend.upload(Path::new("raw_page/p1.png"), b"\x89PNG").unwrap());
        assert!(backend.exists(Path::new("raw_page/p1.png")).unwrap());
        assert_eq!(backend.download(Path::new("raw_page/p1.png")).unwrap(), b"\x89PNG");
        backend.delete(Path::new("raw_page/p1.png")).unwrap();
        assert!(backend.download(Path::new("raw_page/p1.png")).unwrap_err().is_not_found());
        assert_eq!(mock.downloads(), 2);
    }

    #[test]
    fn test_clones_share_runtime() {
        let backend = BlockingBackend::new(Arc::new(MockBackend::default())).unwrap();
        let clone = backend.clone();
        let handle = std::thread::spawn(move || clone.upload(Path::new("from-thread"), b"x").unwrap());
        assert!(handle.join().unwrap());
        assert!(backend.exists(Path::new("from-thread")).unwrap());
    }
}
