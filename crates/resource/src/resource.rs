use crate::error::{ErrorKind, Result};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Identity of a resource: its name and version.
///
/// Both parts end up as path components, so they must be non-empty and may
/// not contain separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceSpec {
    name: String,
    version: String,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let (name, version) = (name.into(), version.into());
        for part in [&name, &version] {
            if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\', '\0']) {
                exn::bail!(ErrorKind::InvalidSpec(format!("{name}:{version}")));
            }
        }
        Ok(Self { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory name of this version, `V<version>`.
    pub fn version_dir(&self) -> String {
        format!("V{}", self.version)
    }
}

impl Display for ResourceSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A registered resource.
///
/// Paths are fixed when the resource is registered. The loaded flag only
/// ever goes from `false` to `true`.
#[derive(Debug)]
pub struct Resource {
    spec: ResourceSpec,
    local_path: PathBuf,
    remote_path: PathBuf,
    loaded: AtomicBool,
    /// Held for the whole of a load so concurrent first loads fetch once.
    pub(crate) load_lock: Mutex<()>,
}

impl Resource {
    pub(crate) fn new(spec: ResourceSpec, resources_root: &Path, remote_root: &str) -> Self {
        let local_path = resources_root.join(spec.name()).join(spec.version_dir());
        let remote_path = Path::new(remote_root).join(spec.name()).join(spec.version_dir());
        Self {
            spec,
            local_path,
            remote_path,
            loaded: AtomicBool::new(false),
            load_lock: Mutex::new(()),
        }
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn version(&self) -> &str {
        self.spec.version()
    }

    /// `resources_root/<name>/V<version>`
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// `remote_root/<name>/V<version>`, relative to the storage backend root.
    pub fn remote_path(&self) -> &Path {
        &self.remote_path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    /// Path of a file inside the resource folder.
    ///
    /// Does not check that the resource is loaded or that the file exists.
    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.local_path.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_paths() {
        let spec = ResourceSpec::new("stopwords", "2.0").unwrap();
        let resource = Resource::new(spec, Path::new("/var/cache/rvs"), "prod/resources");
        assert_eq!(resource.local_path(), Path::new("/var/cache/rvs/stopwords/V2.0"));
        assert_eq!(resource.remote_path(), Path::new("prod/resources/stopwords/V2.0"));
        assert_eq!(resource.file("lang/en.txt"), Path::new("/var/cache/rvs/stopwords/V2.0/lang/en.txt"));
        assert!(!resource.is_loaded());
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceSpec::new("layout-model", "3").unwrap().to_string(), "layout-model:3");
    }

    #[rstest]
    #[case("", "1.0")]
    #[case("stopwords", "")]
    #[case("a/b", "1.0")]
    #[case("stopwords", "../1.0")]
    #[case("..", "1.0")]
    #[case("nul\0", "1.0")]
    fn test_invalid_spec(#[case] name: &str, #[case] version: &str) {
        let err = ResourceSpec::new(name, version).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidSpec(_)));
    }
}
