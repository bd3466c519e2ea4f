//! In-memory metadata backend for testing.

use crate::backend::MetadataBackend;
use crate::document::Document;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};

type Collection = BTreeMap<String, Map<String, Value>>;

struct Failure {
    kind: ErrorKind,
    remaining: usize,
}

/// In-memory metadata backend for testing.
///
/// Every commit attempt is recorded (successful or not) so tests can assert
/// on how a caller chunked and retried its writes. Failures are scripted per
/// document id: any commit containing that id fails while the script has
/// attempts left.
///
/// ```
/// use rvs_metadata::backend::{MetadataBackend, MockMetadataBackend};
/// use rvs_metadata::Document;
/// use rvs_metadata::error::ErrorKind;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockMetadataBackend::new(2).fail_commits_containing("p1", ErrorKind::Transient, 1);
/// assert!(backend.commit("raw_page", &[Document::new("p1")]).await.is_err());
/// assert!(backend.commit("raw_page", &[Document::new("p1")]).await.is_ok());
/// assert_eq!(backend.attempts().await, vec![1, 1]);
/// # }
/// ```
pub struct MockMetadataBackend {
    max_batch_size: usize,
    collections: RwLock<HashMap<String, Collection>>,
    failures: Mutex<HashMap<String, Failure>>,
    attempts: Mutex<Vec<usize>>,
}

impl MockMetadataBackend {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            collections: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `times` commits whose batch contains `id`.
    ///
    /// Pass `usize::MAX` to fail for good.
    pub fn fail_commits_containing(mut self, id: impl Into<String>, kind: ErrorKind, times: usize) -> Self {
        self.failures.get_mut().insert(id.into(), Failure { kind, remaining: times });
        self
    }

    /// Size of every batch passed to `commit`, in call order.
    pub async fn attempts(&self) -> Vec<usize> {
        self.attempts.lock().await.clone()
    }

    /// Number of documents stored in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map_or(0, BTreeMap::len)
    }

    async fn scripted_failure(&self, batch: &[Document]) -> Option<ErrorKind> {
        let mut failures = self.failures.lock().await;
        for document in batch {
            if let Some(failure) = failures.get_mut(&document.id)
                && failure.remaining > 0
            {
                failure.remaining -= 1;
                return Some(failure.kind.clone());
            }
        }
        None
    }
}

impl Default for MockMetadataBackend {
    fn default() -> Self {
        Self::new(rvs_config::DEFAULT_MAX_BATCH_SIZE)
    }
}

#[async_trait]
impl MetadataBackend for MockMetadataBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn commit(&self, collection: &str, batch: &[Document]) -> Result<()> {
        self.attempts.lock().await.push(batch.len());
        if batch.len() > self.max_batch_size {
            exn::bail!(ErrorKind::BatchTooLarge { size: batch.len(), limit: self.max_batch_size });
        }
        if let Some(kind) = self.scripted_failure(batch).await {
            exn::bail!(kind);
        }
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        for document in batch {
            stored.insert(document.id.clone(), document.fields.clone());
        }
        Ok(())
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| stored.get(id).map(|fields| Document { id: id.clone(), fields: fields.clone() }))
            .collect())
    }

    async fn list_ids(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        Ok(self.scan(collection, after, limit, Some(&[])).await?.into_iter().map(|d| d.id).collect())
    }

    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(stored
            .iter()
            .filter(|(id, _)| after.is_none_or(|after| id.as_str() > after))
            .take(limit)
            .map(|(id, values)| {
                let document = Document { id: id.clone(), fields: values.clone() };
                match fields {
                    Some(fields) => document.project(fields),
                    None => document,
                }
            })
            .collect())
    }
}
