//! Versioned resource bundles.
//!
//! A resource is a folder of files (word lists, model weights, lookup
//! tables) identified by a name and a version. It lives at
//! `resources_root/<name>/V<version>` on the local machine and as a single
//! archived blob at `remote_root/<name>/V<version>` in remote storage.
//!
//! [`ResourceCache`] is the registry: it hands out one shared [`Resource`]
//! per identity and makes sure the remote blob is fetched and unpacked at
//! most once, however many threads ask for it at the same time.
//!
//! ```no_run
//! use rvs_config::RvsConfig;
//! use rvs_resource::{ResourceCache, ResourceSpec};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RvsConfig::load()?;
//! let cache = ResourceCache::from_config(&config)?;
//! let stopwords = cache.load(&ResourceSpec::new("stopwords", "2.0")?)?;
//! let english = std::fs::read_to_string(stopwords.file("en.txt"))?;
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod error;
mod resource;

pub use crate::cache::ResourceCache;
pub use crate::resource::{Resource, ResourceSpec};
