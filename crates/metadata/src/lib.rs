//! Batched client for the metadata index.
//!
//! Metadata is stored as flat [`Document`]s grouped into named collections.
//! Backends accept a limited number of documents per atomic commit, so
//! writes go through a [`BatchedStore`] that chunks them, retries transient
//! failures with backoff, and carries on past batches that cannot be
//! committed. The result of a bulk insert lists exactly the documents that
//! made it, by their position in the input.
//!
//! ```no_run
//! use rvs_metadata::{BatchedStore, Database, Document, SqliteBackend};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::new(Database::connect("metadata.sqlite").await?);
//! let store = BatchedStore::new(Arc::new(backend), "enriched_page");
//! let inserted = store.insert_many(&[Document::new("page-1").with_field("fp_prob", 0.1)]).await;
//! assert_eq!(inserted, vec![(0, "page-1".to_string())]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod db;
mod document;
pub mod error;
mod retry;
mod store;

pub use crate::backend::{MetadataBackend, MetadataHandle, SqliteBackend};
pub use crate::db::Database;
pub use crate::document::{Document, ID_FIELD, Record};
pub use crate::retry::RetryPolicy;
pub use crate::store::{BatchedStore, Inserted};
