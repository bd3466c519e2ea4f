use crate::collection::{DocumentCollection, MetadataCollection};
use crate::content::{ContentCollection, ContentRecord};
use crate::error::{ErrorKind, Result};
use crate::schema::{EnrichedPageRecord, LocationType, RawPageMetadataRecord, RawPageRecord};
use exn::ResultExt;
use futures::Stream;
use rvs_config::{DEFAULT_MAX_CONCURRENCY, DEFAULT_PAGE_SIZE, RvsConfig};
use rvs_metadata::{BatchedStore, Document, MetadataBackend, MetadataHandle, Record, RetryPolicy, SqliteBackend};
use rvs_storage::{BackendFactory, BackendHandle, BackendKind};
use std::pin::Pin;
use std::sync::Arc;

pub const RAW_PAGE_COLLECTION: &str = "raw_page";
pub const ENRICHED_PAGE_COLLECTION: &str = "enriched_page";

/// Lazily paged stream over a collection.
pub type CollectionStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Tuning shared by every collection a manager hands out.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagerOptions {
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
    pub page_size: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self { retry: RetryPolicy::default(), max_concurrency: DEFAULT_MAX_CONCURRENCY, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl ManagerOptions {
    pub fn from_config(config: &RvsConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config.metadata),
            max_concurrency: config.collections.max_concurrency,
            page_size: config.collections.page_size,
        }
    }
}

/// Entry point to the page collections.
///
/// Owns the metadata index and the content backend, exposes the `raw_page`
/// and `enriched_page` collections, and builds other named collections on
/// request.
pub struct CollectionManager {
    metadata: MetadataHandle,
    content: BackendHandle,
    location_type: LocationType,
    options: ManagerOptions,
    raw_pages: ContentCollection<RawPageRecord>,
    enriched_pages: DocumentCollection<EnrichedPageRecord>,
}

impl CollectionManager {
    pub fn new(
        metadata: MetadataHandle,
        content: BackendHandle,
        location_type: LocationType,
        options: ManagerOptions,
    ) -> Self {
        let store = |name: &str| BatchedStore::new(metadata.clone(), name).with_retry(options.retry.clone());
        let raw_pages = ContentCollection::new(store(RAW_PAGE_COLLECTION), content.clone(), location_type)
            .with_max_concurrency(options.max_concurrency);
        let enriched_pages = DocumentCollection::new(store(ENRICHED_PAGE_COLLECTION));
        Self { metadata, content, location_type, options, raw_pages, enriched_pages }
    }

    /// Open the metadata index and content backend named in the configuration.
    ///
    /// Page content goes to `collections.content_backend` when set, and to
    /// the resource storage backend otherwise (honouring `read_only`).
    pub async fn from_config(config: &RvsConfig) -> Result<Self> {
        let metadata = SqliteBackend::from_config(&config.metadata).await.or_raise(|| ErrorKind::Config)?;
        let (tag, backend_config, read_only) = match &config.collections.content_backend {
            Some(tag) => (tag.as_str(), &config.collections.content_config, false),
            None => (config.storage.remote_storage_type.as_str(), &config.storage.storage_config, config.storage.read_only),
        };
        let kind = tag.parse::<BackendKind>().or_raise(|| ErrorKind::Config)?;
        let mut content = BackendFactory::build(tag, backend_config).or_raise(|| ErrorKind::Config)?;
        if read_only {
            content = BackendFactory::read_only(content);
        }
        tracing::info!(metadata = metadata.name(), content = %kind, read_only, "Collections ready");
        Ok(Self::new(Arc::new(metadata), content, kind.into(), ManagerOptions::from_config(config)))
    }

    pub fn raw_pages(&self) -> &ContentCollection<RawPageRecord> {
        &self.raw_pages
    }

    pub fn enriched_pages(&self) -> &DocumentCollection<EnrichedPageRecord> {
        &self.enriched_pages
    }

    pub fn content_backend(&self) -> &BackendHandle {
        &self.content
    }

    fn store(&self, name: &str) -> BatchedStore {
        BatchedStore::new(self.metadata.clone(), name).with_retry(self.options.retry.clone())
    }

    /// A metadata-only collection of `T` records.
    pub fn collection<T: Record>(&self, name: &str) -> DocumentCollection<T> {
        DocumentCollection::new(self.store(name))
    }

    /// A collection of `R` records with content in the content backend.
    pub fn content_collection<R: ContentRecord>(&self, name: &str) -> ContentCollection<R> {
        ContentCollection::new(self.store(name), self.content.clone(), self.location_type)
            .with_max_concurrency(self.options.max_concurrency)
    }

    /// Every id in the collection, fetched one page at a time.
    pub fn iterate_ids(&self, collection: &str) -> CollectionStream<'_, String> {
        let store = self.store(collection);
        let page_size = self.options.page_size.max(1);
        Box::pin(async_stream::try_stream! {
            let mut after: Option<String> = None;
            loop {
                let page = store.ids_page(after.as_deref(), page_size).await.or_raise(|| ErrorKind::Metadata)?;
                let last_page = page.len() < page_size;
                for id in page {
                    after = Some(id.clone());
                    yield id;
                }
                if last_page {
                    break;
                }
            }
        })
    }

    /// Every document in the collection, projected onto `fields` when given.
    ///
    /// An empty field list means all fields.
    pub fn iterate_collection(&self, collection: &str, fields: Option<Vec<String>>) -> CollectionStream<'_, Document> {
        let store = self.store(collection);
        let page_size = self.options.page_size.max(1);
        let fields = fields.filter(|fields| !fields.is_empty());
        Box::pin(async_stream::try_stream! {
            let mut after: Option<String> = None;
            loop {
                let page = store
                    .documents_page(after.as_deref(), page_size, fields.as_deref())
                    .await
                    .or_raise(|| ErrorKind::Metadata)?;
                let last_page = page.len() < page_size;
                for document in page {
                    after = Some(document.id.clone());
                    yield document;
                }
                if last_page {
                    break;
                }
            }
        })
    }

    /// Like [`iterate_collection`](Self::iterate_collection), re-hydrated as `T`.
    ///
    /// With a projection, `T` must tolerate the missing fields.
    pub fn iterate_records<T: Record + 'static>(
        &self,
        collection: &str,
        fields: Option<Vec<String>>,
    ) -> CollectionStream<'_, T> {
        let documents = self.iterate_collection(collection, fields);
        Box::pin(async_stream::try_stream! {
            for await document in documents {
                yield T::from_document(document?).or_raise(|| ErrorKind::Metadata)?;
            }
        })
    }

    /// Untyped documents by id. Unknown ids are left out.
    pub async fn fetch_documents(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>> {
        self.store(collection).get_many(ids).await.or_raise(|| ErrorKind::Metadata)
    }

    /// Insert raw pages with their images, returning how many were stored.
    pub async fn insert_raw_pages(&self, pages: &[RawPageRecord]) -> Result<usize> {
        Ok(self.raw_pages.insert(pages).await?.len())
    }

    pub async fn fetch_raw_pages(&self, ids: &[String]) -> Result<Vec<RawPageRecord>> {
        self.raw_pages.fetch(ids, None).await
    }

    /// Raw page metadata without downloading any image.
    pub async fn fetch_raw_pages_metadata(&self, ids: &[String]) -> Result<Vec<RawPageMetadataRecord>> {
        self.raw_pages.fetch_metadata(ids).await
    }

    pub async fn insert_enriched_pages(&self, pages: &[EnrichedPageRecord]) -> Result<usize> {
        let inserted = self.enriched_pages.insert(pages).await?.len();
        tracing::info!(inserted, "Inserted enriched page records");
        Ok(inserted)
    }

    pub async fn fetch_enriched_pages(&self, ids: &[String]) -> Result<Vec<EnrichedPageRecord>> {
        self.enriched_pages.fetch(ids).await
    }
}

impl std::fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionManager")
            .field("metadata", &self.metadata.name())
            .field("content", &self.content.name())
            .field("location_type", &self.location_type)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentRecord;
    use futures::TryStreamExt;
    use rvs_metadata::backend::MockMetadataBackend;
    use rvs_storage::backend::MockBackend;
    use rvs_storage::StorageBackend;
    use serde_json::json;

    fn manager(page_size: usize) -> CollectionManager {
        let options = ManagerOptions { retry: RetryPolicy::none(), max_concurrency: 4, page_size };
        CollectionManager::new(
            Arc::new(MockMetadataBackend::new(500)),
            Arc::new(MockBackend::default()),
            LocationType::File,
            options,
        )
    }

    fn raw_page(id: &str) -> RawPageRecord {
        RawPageRecord {
            id: id.to_string(),
            image_format: Some("png".to_string()),
            image: Some(id.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_raw_pages() {
        let manager = manager(10);
        let pages: Vec<_> = ["p1", "p2", "p3"].into_iter().map(raw_page).collect();
        assert_eq!(manager.insert_raw_pages(&pages).await.unwrap(), 3);

        let ids = vec!["p3".to_string(), "p9".to_string()];
        let fetched = manager.fetch_raw_pages(&ids).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].image.as_deref(), Some(&b"p3"[..]));

        let metadata = manager.fetch_raw_pages_metadata(&ids).await.unwrap();
        assert_eq!(metadata[0].content_location.as_deref(), Some("raw_page/p3.png"));
    }

    #[tokio::test]
    async fn test_enriched_pages() {
        let manager = manager(10);
        let page = EnrichedPageRecord {
            id: "p1".to_string(),
            layout_embedding: Some(vec![0.5; 4]),
            ocr: Some(json!({"text": "hello"})),
            ..Default::default()
        };
        assert_eq!(manager.insert_enriched_pages(std::slice::from_ref(&page)).await.unwrap(), 1);
        assert_eq!(manager.fetch_enriched_pages(&["p1".to_string()]).await.unwrap(), vec![page]);
    }

    #[tokio::test]
    async fn test_iterate_ids_pages_until_short_page() {
        let manager = manager(3);
        let pages: Vec<_> = (0..7).map(|i| raw_page(&format!("p{i}"))).collect();
        manager.insert_raw_pages(&pages).await.unwrap();

        let ids: Vec<String> = manager.iterate_ids(RAW_PAGE_COLLECTION).try_collect().await.unwrap();
        assert_eq!(ids, ["p0", "p1", "p2", "p3", "p4", "p5", "p6"]);
    }

    #[tokio::test]
    async fn test_iterate_ids_exact_multiple_of_page_size() {
        let manager = manager(2);
        let pages: Vec<_> = (0..4).map(|i| raw_page(&format!("p{i}"))).collect();
        manager.insert_raw_pages(&pages).await.unwrap();

        let ids: Vec<String> = manager.iterate_ids(RAW_PAGE_COLLECTION).try_collect().await.unwrap();
        assert_eq!(ids.len(), 4);
        let empty: Vec<String> = manager.iterate_ids("nothing_here").try_collect().await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_iterate_collection_and_records() {
        let manager = manager(2);
        let documents = manager.collection::<DocumentRecord>("document");
        let records: Vec<_> = (0..3)
            .map(|i| DocumentRecord { id: format!("d{i}"), n_pages: Some(i), pages: Some(vec![format!("p{i}")]) })
            .collect();
        documents.insert(&records).await.unwrap();

        let projected: Vec<Document> = manager
            .iterate_collection("document", Some(vec!["n_pages".to_string()]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(projected.len(), 3);
        assert!(projected.iter().all(|d| d.get("pages").is_none() && d.get("n_pages").is_some()));

        let all: Vec<DocumentRecord> = manager.iterate_records("document", Some(Vec::new())).try_collect().await.unwrap();
        assert_eq!(all, records);

        let fetched = manager.fetch_documents("document", &["d1".to_string(), "d7".to_string()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].clone().into_value(), json!({"id": "d1", "n_pages": 1, "pages": ["p1"]}));
    }

    #[tokio::test]
    async fn test_named_content_collection() {
        let manager = manager(10);
        let scans = manager.content_collection::<RawPageRecord>("rescanned_page");
        scans.insert_single(&raw_page("p1")).await.unwrap();
        let blob = manager.content_backend().download(std::path::Path::new("rescanned_page/p1.png")).await.unwrap();
        assert_eq!(blob, b"p1");
        assert!(manager.fetch_raw_pages(&["p1".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_with_local_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RvsConfig::default();
        config.collections.content_backend = Some("local-filesystem".to_string());
        config.collections.content_config =
            json!({ "root": dir.path() }).as_object().cloned().unwrap();

        let manager = CollectionManager::from_config(&config).await.unwrap();
        assert_eq!(manager.insert_raw_pages(&[raw_page("p1")]).await.unwrap(), 1);
        assert!(dir.path().join("raw_page/p1.png").exists());
        assert_eq!(manager.fetch_raw_pages(&["p1".to_string()]).await.unwrap()[0].image.as_deref(), Some(&b"p1"[..]));
    }

    #[tokio::test]
    async fn test_from_config_unknown_backend() {
        let mut config = RvsConfig::default();
        config.collections.content_backend = Some("carrier-pigeon".to_string());
        let err = CollectionManager::from_config(&config).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Config);
    }
}
