//! `rvs.json` discovery and loading.
//!
//! Configuration is loaded once at start-up with [`RvsConfig::load`] (or
//! [`RvsConfig::from_path`]) and then passed by reference to whatever needs
//! it. Nothing in the workspace reads configuration implicitly.
//!
//! Keys are snake_case; camelCase spellings are accepted as aliases. Any key
//! can be overridden from the environment with the `RVS_` prefix, using `__`
//! to descend into sections:
//!
//! ```text
//! RVS_RESOURCES_ROOT=/var/cache/rvs
//! RVS_STORAGE__READ_ONLY=true
//! RVS_STORAGE__STORAGE_CONFIG__ROOT=/mnt/shared/rvs
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::{BaseDirs, ProjectDirs};
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use rvs_compress::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Directory searched first for [`CONFIG_FILE_NAME`].
pub const CONFIG_DIR_ENV: &str = "RVS_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "rvs.json";
const ENV_PREFIX: &str = "RVS_";

pub const DEFAULT_REMOTE_ROOT: &str = "resources";
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;
pub const DEFAULT_COMMIT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Root configuration object.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RvsConfig {
    /// Local directory that resource bundles are unpacked under. A leading
    /// `~` is expanded to the home directory on load.
    #[serde(alias = "resourcesRoot")]
    pub resources_root: PathBuf,
    /// Prefix of resource bundles inside the remote storage backend.
    #[serde(alias = "remoteRoot")]
    pub remote_root: String,
    pub storage: StorageSettings,
    pub archive: ArchiveSettings,
    pub metadata: MetadataSettings,
    pub collections: CollectionSettings,
}

/// Remote storage for resource bundles.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// Backend type tag, e.g. `local-filesystem` or `object-store`.
    #[serde(alias = "remoteStorageType")]
    pub remote_storage_type: String,
    /// Backend-specific key/value configuration.
    #[serde(alias = "storageConfig")]
    pub storage_config: Map<String, Value>,
    /// Skip all writes to the remote backend.
    #[serde(alias = "readOnly")]
    pub read_only: bool,
}

/// How resource folders are packed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Compression applied by the tar layer.
    pub mode: Compression,
    /// Byte compressor applied to the finished archive.
    pub compressor: Compression,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataSettings {
    /// SQLite database file; in-memory when unset.
    pub database: Option<PathBuf>,
    #[serde(alias = "maxBatchSize")]
    pub max_batch_size: usize,
    /// Overall retry budget for one batch commit.
    #[serde(alias = "commitTimeoutSecs")]
    pub commit_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollectionSettings {
    /// Upper bound on in-flight blob transfers per call.
    #[serde(alias = "maxConcurrency")]
    pub max_concurrency: usize,
    /// Ids fetched per page when iterating a collection.
    #[serde(alias = "pageSize")]
    pub page_size: usize,
    /// Backend for page content; the resource storage backend when unset.
    #[serde(alias = "contentBackend")]
    pub content_backend: Option<String>,
    #[serde(alias = "contentConfig")]
    pub content_config: Map<String, Value>,
}

impl Default for RvsConfig {
    fn default() -> Self {
        Self {
            resources_root: default_resources_root(),
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            storage: StorageSettings::default(),
            archive: ArchiveSettings::default(),
            metadata: MetadataSettings::default(),
            collections: CollectionSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            remote_storage_type: "local".to_string(),
            storage_config: Map::new(),
            read_only: false,
        }
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self { mode: Compression::Gzip, compressor: Compression::Snappy }
    }
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            database: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            commit_timeout_secs: DEFAULT_COMMIT_TIMEOUT_SECS,
        }
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            content_backend: None,
            content_config: Map::new(),
        }
    }
}

fn default_resources_root() -> PathBuf {
    ProjectDirs::from("", "", "rvs")
        .map(|dirs| dirs.cache_dir().join("resources"))
        .unwrap_or_else(|| PathBuf::from("~/.rvs/resources"))
}

/// Expand a leading `~` component to the current user's home directory.
///
/// `~user` forms are left untouched.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match (path.strip_prefix("~"), BaseDirs::new()) {
        (Ok(rest), Some(dirs)) if rest.as_os_str().is_empty() => dirs.home_dir().to_path_buf(),
        (Ok(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => path.to_path_buf(),
    }
}

impl RvsConfig {
    /// Find the configuration file.
    ///
    /// Checked in order: `$RVS_CONFIG_DIR/rvs.json`, `./rvs.json`,
    /// `./rvs/rvs.json`.
    pub fn locate() -> Option<PathBuf> {
        let config_dir = std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from);
        let cwd = std::env::current_dir().unwrap_or_default();
        locate_in(config_dir.as_deref(), &cwd)
    }

    /// Locate and load the configuration, falling back to defaults (plus
    /// environment overrides) when no file is found.
    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => Self::from_path(path),
            None => {
                tracing::warn!(
                    env = CONFIG_DIR_ENV,
                    file = CONFIG_FILE_NAME,
                    "No configuration file found, using defaults"
                );
                Self::extract(Figment::new())
            },
        }
    }

    /// Load an explicit configuration file (`.json`, `.toml`, `.yaml`/`.yml`)
    /// plus environment overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Figment::from(Json::file_exact(path)),
            Some("toml") => Figment::from(Toml::file_exact(path)),
            Some("yaml" | "yml") => Figment::from(Yaml::file_exact(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::info!(path = %path.display(), "Loading configuration");
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let env = Env::prefixed(ENV_PREFIX).ignore(&["CONFIG_DIR"]).split("__");
        let mut config: Self =
            figment.merge(env).extract().map_err(|err| ErrorKind::Invalid(err.to_string()))?;
        config.resources_root = expand_home(&config.resources_root);
        config.metadata.database = config.metadata.database.map(expand_home);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.metadata.max_batch_size == 0 {
            exn::bail!(ErrorKind::Invalid("metadata.max_batch_size must be positive".to_string()));
        }
        if self.collections.max_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("collections.max_concurrency must be positive".to_string()));
        }
        if self.collections.page_size == 0 {
            exn::bail!(ErrorKind::Invalid("collections.page_size must be positive".to_string()));
        }
        Ok(())
    }
}

fn locate_in(config_dir: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    config_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .into_iter()
        .chain([cwd.join(CONFIG_FILE_NAME), cwd.join("rvs").join(CONFIG_FILE_NAME)])
        .find(|candidate| candidate.is_file())
}
