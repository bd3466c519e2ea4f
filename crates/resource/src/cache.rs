use crate::error::{ErrorKind, Result};
use crate::resource::{Resource, ResourceSpec};
use dashmap::DashMap;
use exn::ResultExt;
use rvs_compress::FolderArchiver;
use rvs_config::RvsConfig;
use rvs_storage::{BackendFactory, BlockingBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Registry of resources, keyed by [`ResourceSpec`].
///
/// There is exactly one [`Resource`] per identity for the lifetime of the
/// cache; entries are never evicted. Loading is blocking: it talks to the
/// storage backend through a [`BlockingBackend`] and unpacks on the calling
/// thread, so async callers should go through
/// [`spawn_blocking`](https://docs.rs/tokio/latest/tokio/task/fn.spawn_blocking.html).
pub struct ResourceCache {
    resources_root: PathBuf,
    remote_root: String,
    backend: BlockingBackend,
    archiver: FolderArchiver,
    registry: DashMap<ResourceSpec, Arc<Resource>>,
}

impl ResourceCache {
    pub fn new(
        resources_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        backend: BlockingBackend,
        archiver: FolderArchiver,
    ) -> Self {
        Self {
            resources_root: resources_root.into(),
            remote_root: remote_root.into(),
            backend,
            archiver,
            registry: DashMap::new(),
        }
    }

    /// Build the cache described by `config`: the remote backend from
    /// `storage` (wrapped read-only if requested) and the archiver from
    /// `archive`.
    pub fn from_config(config: &RvsConfig) -> Result<Self> {
        let mut handle = BackendFactory::build(&config.storage.remote_storage_type, &config.storage.storage_config)
            .or_raise(|| ErrorKind::Config)?;
        if config.storage.read_only {
            handle = BackendFactory::read_only(handle);
        }
        let backend = BlockingBackend::new(handle).or_raise(|| ErrorKind::Config)?;
        let archiver = FolderArchiver::new(config.archive.compressor, config.archive.mode);
        Ok(Self::new(&config.resources_root, &config.remote_root, backend, archiver))
    }

    pub fn resources_root(&self) -> &Path {
        &self.resources_root
    }

    /// The shared instance for `spec`, registering it if needed. Does not
    /// load anything.
    pub fn get(&self, spec: &ResourceSpec) -> Arc<Resource> {
        if let Some(existing) = self.registry.get(spec) {
            return existing.clone();
        }
        self.registry
            .entry(spec.clone())
            .or_insert_with(|| Arc::new(Resource::new(spec.clone(), &self.resources_root, &self.remote_root)))
            .clone()
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Make sure the resource folder exists locally.
    ///
    /// Uses the local folder if it is already there; otherwise downloads the
    /// remote archive and unpacks it. A failed fetch leaves the resource
    /// unloaded so that a later call can try again.
    ///
    /// # Errors
    /// - [`ResourceUnavailable`](ErrorKind::ResourceUnavailable) if the
    ///   archive could not be downloaded.
    /// - [`Archive`](ErrorKind::Archive) if it could not be unpacked.
    #[instrument(skip(self, spec), fields(resource = %spec))]
    pub fn load(&self, spec: &ResourceSpec) -> Result<Arc<Resource>> {
        let resource = self.get(spec);
        if resource.is_loaded() {
            tracing::debug!("Resource already loaded");
            return Ok(resource);
        }
        let _guard = resource.load_lock.lock();
        // Another thread may have finished the load while we waited.
        if resource.is_loaded() {
            tracing::debug!("Resource already loaded");
            return Ok(Arc::clone(&resource));
        }
        if resource.local_path().exists() {
            tracing::info!(path = %resource.local_path().display(), "Resource exists locally");
            resource.mark_loaded();
            return Ok(Arc::clone(&resource));
        }

        tracing::info!(remote = %resource.remote_path().display(), "Resource not found locally, fetching from remote");
        let bundle = self
            .backend
            .download(resource.remote_path())
            .or_raise(|| ErrorKind::ResourceUnavailable(spec.to_string()))?;
        self.unpack(&resource, &bundle)?;
        tracing::info!(path = %resource.local_path().display(), bytes = bundle.len(), "Resource unpacked");
        resource.mark_loaded();
        Ok(Arc::clone(&resource))
    }

    /// Unpack into a staging directory next to the final location, then move
    /// the folder into place, so a failed unpack never leaves a partial
    /// folder that a later load would mistake for a complete one.
    fn unpack(&self, resource: &Resource, bundle: &[u8]) -> Result<()> {
        let local_path = resource.local_path();
        let parent = local_path.parent().unwrap_or(&self.resources_root);
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Archive)?;
        let staging = tempfile::Builder::new().prefix(".rvs-unpack-").tempdir_in(parent).or_raise(|| ErrorKind::Archive)?;
        self.archiver.decompress_to_folder(bundle, staging.path()).or_raise(|| ErrorKind::Archive)?;

        let unpacked = staging.path().join(resource.spec().version_dir());
        if !unpacked.is_dir() {
            tracing::error!(expected = %resource.spec().version_dir(), "Archive does not contain the resource folder");
            exn::bail!(ErrorKind::Archive);
        }
        if let Err(err) = std::fs::rename(&unpacked, local_path) {
            // Someone outside this process got there first.
            if !local_path.is_dir() {
                return Err(err).or_raise(|| ErrorKind::Archive);
            }
            tracing::warn!(path = %local_path.display(), "Resource folder appeared during unpack, keeping existing");
        }
        Ok(())
    }

    /// Archive the local resource folder and upload it to its remote path.
    ///
    /// Returns the backend's answer: `false` when the backend is read-only.
    /// Failures are reported, not retried.
    #[instrument(skip(self, spec), fields(resource = %spec))]
    pub fn upload(&self, spec: &ResourceSpec) -> Result<bool> {
        let resource = self.get(spec);
        let bundle = self.archiver.compress_folder(resource.local_path()).or_raise(|| ErrorKind::Archive)?;
        tracing::debug!(bytes = bundle.len(), remote = %resource.remote_path().display(), "Uploading resource");
        let written = self.backend.upload(resource.remote_path(), &bundle).or_raise(|| ErrorKind::Storage)?;
        if written {
            tracing::info!(remote = %resource.remote_path().display(), "Resource uploaded");
        }
        Ok(written)
    }
}
