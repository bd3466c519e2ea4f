use crate::backend::MetadataHandle;
use crate::document::{Document, Record};
use crate::error::Result;
use crate::retry::RetryPolicy;
use std::collections::HashSet;
use tracing::instrument;

/// Index of a document in the caller's input, paired with its id.
pub type Inserted = (usize, String);

/// Bulk access to one collection of a [`MetadataBackend`](crate::MetadataBackend).
///
/// Writes are chunked into batches no larger than the backend accepts. Each
/// batch commits on its own: a batch that still fails after the retry policy
/// gives up is logged and skipped, and the remaining batches go ahead.
#[derive(Clone)]
pub struct BatchedStore {
    backend: MetadataHandle,
    collection: String,
    retry: RetryPolicy,
}

impl BatchedStore {
    pub fn new(backend: MetadataHandle, collection: impl Into<String>) -> Self {
        Self { backend, collection: collection.into(), retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &MetadataHandle {
        &self.backend
    }

    /// Insert documents, returning `(input index, id)` for every document
    /// in a batch that committed.
    ///
    /// Documents of skipped batches are absent from the result. Nothing is
    /// returned as an error; check the result length against the input.
    #[instrument(skip_all, fields(collection = %self.collection, documents = documents.len()))]
    pub async fn insert_many(&self, documents: &[Document]) -> Vec<Inserted> {
        let batch_size = self.backend.max_batch_size().max(1);
        let mut inserted = Vec::with_capacity(documents.len());
        for (number, batch) in documents.chunks(batch_size).enumerate() {
            let offset = number * batch_size;
            match self.retry.run(|| self.backend.commit(&self.collection, batch)).await {
                Ok(()) => {
                    tracing::info!(batch = number, offset, size = batch.len(), "Batch committed");
                    inserted.extend(batch.iter().enumerate().map(|(i, doc)| (offset + i, doc.id.clone())));
                }
                Err(err) => {
                    tracing::error!(batch = number, offset, size = batch.len(), error = ?err, "Batch failed, skipping");
                }
            }
        }
        inserted
    }

    /// Convert and insert typed records.
    ///
    /// Conversion happens up front, so a record that cannot be serialized
    /// fails the whole call before anything is written.
    pub async fn insert_records<R: Record>(&self, records: &[R]) -> Result<Vec<Inserted>> {
        let documents = records.iter().map(Record::to_document).collect::<Result<Vec<_>>>()?;
        Ok(self.insert_many(&documents).await)
    }

    /// Fetch documents by id, in first-request order. Ids with no stored
    /// document are left out and repeated ids come back once.
    #[instrument(skip_all, fields(collection = %self.collection, ids = ids.len()))]
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Document>> {
        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<String> = ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect();
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.backend.max_batch_size().max(1)) {
            found.extend(self.backend.get_many(&self.collection, chunk).await?);
        }
        if found.len() < ids.len() {
            tracing::debug!(requested = ids.len(), found = found.len(), "Some ids have no stored document");
        }
        Ok(found)
    }

    pub async fn get_records<R: Record>(&self, ids: &[String]) -> Result<Vec<R>> {
        self.get_many(ids).await?.into_iter().map(R::from_document).collect()
    }

    /// One page of ids after `after`, in ascending order.
    pub async fn ids_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        self.backend.list_ids(&self.collection, after, limit).await
    }

    /// One page of documents after `after`, optionally projected.
    pub async fn documents_page(
        &self,
        after: Option<&str>,
        limit: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Document>> {
        self.backend.scan(&self.collection, after, limit, fields).await
    }
}

impl std::fmt::Debug for BatchedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedStore")
            .field("backend", &self.backend.name())
            .field("collection", &self.collection)
            .field("retry", &self.retry)
            .finish()
    }
}
