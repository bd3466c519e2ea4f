//! Backend construction from configuration.
//!
//! Backends are selected by a type tag and configured with a free-form JSON
//! object, the shape found under `storage` in `rvs.json`:
//!
//! ```json
//! {
//!     "remote_storage_type": "local-filesystem",
//!     "storage_config": { "root": "/mnt/shared/rvs" }
//! }
//! ```

use crate::backend::{LocalBackend, LocalConfig, ReadOnlyBackend};
use crate::error::{ErrorKind, Result};
use crate::BackendHandle;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

/// Storage backend type tags.
///
/// Every tag is recognised regardless of which features were compiled in;
/// building a backend whose feature is disabled fails with
/// [`UnsupportedBackend`](ErrorKind::UnsupportedBackend).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    S3,
    Ssh,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::S3 => "s3",
            BackendKind::Ssh => "ssh",
            BackendKind::Memory => "memory",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "local-filesystem" => Ok(BackendKind::Local),
            "s3" | "object-store" => Ok(BackendKind::S3),
            "ssh" | "remote-filesystem-over-secure-shell" => Ok(BackendKind::Ssh),
            "memory" => Ok(BackendKind::Memory),
            _ => exn::bail!(ErrorKind::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Builds [`BackendHandle`]s from a type tag and a configuration map.
///
/// # Examples
///
/// ```no_run
/// use rvs_storage::BackendFactory;
/// use serde_json::json;
///
/// # fn example() -> rvs_storage::error::Result<()> {
/// let config = json!({ "root": "/mnt/shared/rvs" });
/// let backend = BackendFactory::build("local-filesystem", config.as_object().unwrap())?;
/// assert_eq!(backend.name(), "local");
/// # Ok(())
/// # }
/// ```
pub struct BackendFactory;

impl BackendFactory {
    /// Build a backend named after its kind.
    pub fn build(kind: &str, config: &Map<String, Value>) -> Result<BackendHandle> {
        let parsed = kind.parse::<BackendKind>()?;
        Self::build_named(parsed.as_str(), parsed, config)
    }

    /// Build a backend with an explicit name (used in logs only).
    pub fn build_named(name: &str, kind: BackendKind, config: &Map<String, Value>) -> Result<BackendHandle> {
        tracing::debug!(name, %kind, "Building storage backend");
        let handle: BackendHandle = match kind {
            BackendKind::Local => {
                let config: LocalConfig = parse_config(kind, config)?;
                Arc::new(LocalBackend::new(name, config.root)?)
            }
            #[cfg(feature = "s3")]
            BackendKind::S3 => Arc::new(crate::backend::S3Backend::new(name, parse_config(kind, config)?)?),
            #[cfg(feature = "ssh")]
            BackendKind::Ssh => Arc::new(crate::backend::SshBackend::new(name, parse_config(kind, config)?)?),
            #[cfg(feature = "mock")]
            BackendKind::Memory => Arc::new(crate::backend::MockBackend::default().with_name(name)),
            #[allow(unreachable_patterns)]
            disabled => exn::bail!(ErrorKind::UnsupportedBackend(format!("{disabled} (feature not enabled)"))),
        };
        Ok(handle)
    }

    /// Wrap a handle so that writes are skipped.
    pub fn read_only(inner: BackendHandle) -> BackendHandle {
        Arc::new(ReadOnlyBackend::new(inner))
    }
}

fn parse_config<T: DeserializeOwned>(kind: BackendKind, config: &Map<String, Value>) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(config.clone()))
        .map_err(|err| ErrorKind::InvalidConfig(kind.to_string(), err.to_string()))?)
}
