//! Metadata backend implementations.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod sqlite;

use crate::Document;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockMetadataBackend;
pub use self::sqlite::SqliteBackend;

/// Shared, type-erased metadata backend.
pub type MetadataHandle = Arc<dyn MetadataBackend>;

/// A document index that stores flat documents per named collection.
///
/// Backends declare how many documents they accept in one atomic commit;
/// callers are expected to chunk (see [`BatchedStore`](crate::BatchedStore)).
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Largest batch that [`commit`](Self::commit) accepts.
    fn max_batch_size(&self) -> usize;

    /// Write every document of the batch, or none of them.
    ///
    /// Existing documents with the same id are replaced.
    async fn commit(&self, collection: &str, batch: &[Document]) -> Result<()>;

    /// Fetch documents by id, in request order. Unknown ids are left out.
    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>>;

    /// Up to `limit` ids strictly greater than `after`, in ascending order.
    async fn list_ids(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>>;

    /// Like [`list_ids`](Self::list_ids) but returns the documents,
    /// optionally projected onto `fields`.
    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Document>>;
}
