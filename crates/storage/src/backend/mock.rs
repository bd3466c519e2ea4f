//! In-memory backend for tests in this and downstream crates.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Default)]
struct State {
    blobs: BTreeMap<PathBuf, Vec<u8>>,
    broken: BTreeSet<PathBuf>,
    downloads: usize,
    uploads: usize,
}

/// Blob store held in memory.
///
/// Every download and upload call is counted, including the ones that fail,
/// and individual paths can be broken on purpose. Construction helpers
/// panic on invalid paths: a test with a bad fixture should not run.
///
/// ```
/// use rvs_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("raw_page/p1.png", b"\x89PNG".to_vec())]);
/// assert!(backend.exists(Path::new("raw_page/p1.png")).await?);
///
/// backend.upload(Path::new("raw_page/p2.png"), b"").await?;
/// assert_eq!(backend.uploads(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    state: Mutex<State>,
}

fn fixture_path(path: impl AsRef<Path>) -> PathBuf {
    match validate_path(path.as_ref()) {
        Ok(valid) => valid,
        Err(err) => panic!("MockBackend fixture has an invalid path: {err}"),
    }
}

impl MockBackend {
    pub fn with_files(files: impl IntoIterator<Item = (impl AsRef<Path>, impl Into<Vec<u8>>)>) -> Self {
        let blobs = files.into_iter().map(|(path, data)| (fixture_path(path), data.into())).collect();
        Self { name: "memory".to_string(), state: Mutex::new(State { blobs, ..State::default() }) }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Uploads and downloads of `path` fail with a retryable
    /// [`Network`](ErrorKind::Network) error.
    pub fn fail_on(mut self, path: impl AsRef<Path>) -> Self {
        self.state.get_mut().broken.insert(fixture_path(path));
        self
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().downloads
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().uploads
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().blobs.keys().cloned().collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(&str, Vec<u8>)>())
    }
}

impl State {
    fn reachable(&self, path: &Path) -> Result<()> {
        if self.broken.contains(path) {
            exn::bail!(ErrorKind::Network(format!("injected failure for {}", path.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.state.lock().blobs.contains_key(&path))
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.downloads += 1;
        let path = validate_path(path)?;
        state.reachable(&path)?;
        match state.blobs.get(&path) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let mut state = self.state.lock();
        state.uploads += 1;
        let path = validate_path(path)?;
        state.reachable(&path)?;
        state.blobs.insert(path, data.to_vec());
        Ok(true)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        if self.state.lock().blobs.remove(&path).is_none() {
            exn::bail!(ErrorKind::NotFound(path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_calls() {
        let backend = MockBackend::default();
        assert!(backend.upload(Path::new("raw_page/p1.png"), b"png").await.unwrap());
        assert_eq!(backend.download(Path::new("raw_page/p1.png")).await.unwrap(), b"png");
        assert!(backend.download(Path::new("raw_page/p2.png")).await.unwrap_err().is_not_found());
        assert_eq!((backend.uploads(), backend.downloads()), (1, 2));
    }

    #[tokio::test]
    async fn test_fixture_paths_are_normalized() {
        let backend = MockBackend::with_files([("b/./blob", b"plain".to_vec()), ("a/blob.gz", b"packed".to_vec())]);
        assert_eq!(backend.paths(), vec![PathBuf::from("a/blob.gz"), PathBuf::from("b/blob")]);
        assert!(!backend.exists(Path::new("c/blob")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let backend = MockBackend::with_files([("blob", b"data".to_vec())]);
        backend.delete(Path::new("blob")).await.unwrap();
        let err = backend.delete(Path::new("blob")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_broken_path() {
        let backend = MockBackend::default().fail_on("raw_page/bad.png");
        let err = backend.upload(Path::new("raw_page/bad.png"), b"x").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(backend.upload(Path::new("raw_page/good.png"), b"x").await.unwrap());
        assert_eq!(backend.paths(), vec![PathBuf::from("raw_page/good.png")]);
    }

    #[tokio::test]
    async fn test_escaping_paths_are_rejected() {
        let backend = MockBackend::default();
        assert!(backend.download(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.upload(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_bad_fixture_panics() {
        MockBackend::with_files([("../escape", b"bad".to_vec())]);
    }
}
