//! Collections of page records split across a metadata index and blob
//! storage.
//!
//! Small structured fields go to the metadata index through a
//! [`BatchedStore`](rvs_metadata::BatchedStore); large payloads such as page
//! images go to a [`StorageBackend`](rvs_storage::StorageBackend) and the
//! indexed metadata points at them. [`CollectionManager`] wires both up from
//! configuration and exposes the page collections used by the pipeline.
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use rvs_collection::{CollectionManager, RAW_PAGE_COLLECTION};
//! use rvs_config::RvsConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CollectionManager::from_config(&RvsConfig::load()?).await?;
//! let ids: Vec<String> = manager.iterate_ids(RAW_PAGE_COLLECTION).try_collect().await?;
//! let pages = manager.fetch_raw_pages(&ids[..10.min(ids.len())]).await?;
//! # Ok(())
//! # }
//! ```

mod collection;
mod content;
pub mod error;
mod manager;
pub mod schema;

pub use crate::collection::{DocumentCollection, MetadataCollection};
pub use crate::content::{ContentCollection, ContentRecord};
pub use crate::manager::{
    CollectionManager, CollectionStream, ENRICHED_PAGE_COLLECTION, ManagerOptions, RAW_PAGE_COLLECTION,
};
pub use rvs_metadata::{Document, Inserted};
