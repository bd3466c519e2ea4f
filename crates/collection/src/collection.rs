use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use rvs_metadata::{BatchedStore, Inserted, Record};
use std::marker::PhantomData;

/// A named collection of typed records.
#[async_trait]
pub trait MetadataCollection: Send + Sync {
    type Item: Record + 'static;

    fn name(&self) -> &str;

    /// Insert records, returning `(input index, id)` for those committed.
    async fn insert(&self, items: &[Self::Item]) -> Result<Vec<Inserted>>;

    /// Fetch records by id. Unknown ids are left out.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Self::Item>>;

    /// Insert one record, returning its id if it was committed.
    async fn insert_single(&self, item: &Self::Item) -> Result<Option<String>> {
        let inserted = self.insert(std::slice::from_ref(item)).await?;
        Ok(inserted.into_iter().next().map(|(_, id)| id))
    }

    async fn fetch_single(&self, id: &str) -> Result<Option<Self::Item>> {
        Ok(self.fetch(&[id.to_string()]).await?.into_iter().next())
    }
}

/// Metadata-only collection backed by a [`BatchedStore`].
pub struct DocumentCollection<T> {
    store: BatchedStore,
    record: PhantomData<fn() -> T>,
}

impl<T: Record> DocumentCollection<T> {
    pub fn new(store: BatchedStore) -> Self {
        Self { store, record: PhantomData }
    }

    pub fn store(&self) -> &BatchedStore {
        &self.store
    }
}

#[async_trait]
impl<T: Record + 'static> MetadataCollection for DocumentCollection<T> {
    type Item = T;

    fn name(&self) -> &str {
        self.store.collection()
    }

    async fn insert(&self, items: &[T]) -> Result<Vec<Inserted>> {
        let inserted = self.store.insert_records(items).await.or_raise(|| ErrorKind::Metadata)?;
        if inserted.len() < items.len() {
            tracing::warn!(collection = self.name(), inserted = inserted.len(), total = items.len(), "Not every record was committed");
        }
        Ok(inserted)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<T>> {
        self.store.get_records(ids).await.or_raise(|| ErrorKind::Metadata)
    }
}

impl<T> std::fmt::Debug for DocumentCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DocumentCollection").field(&self.store).finish()
    }
}
