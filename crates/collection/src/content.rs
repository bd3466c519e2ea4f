use crate::collection::{DocumentCollection, MetadataCollection};
use crate::error::{ErrorKind, Result};
use crate::schema::{ImageFormat, LocationType};
use exn::ResultExt;
use futures::{StreamExt, TryStreamExt, stream};
use rvs_config::DEFAULT_MAX_CONCURRENCY;
use rvs_metadata::{BatchedStore, Inserted, Record};
use rvs_storage::BackendHandle;
use std::path::Path;
use tracing::instrument;

/// A record made of structured fields plus a binary payload.
///
/// The payload is written to content storage and the record is indexed as
/// its [`Metadata`](Self::Metadata) counterpart, which points at the blob.
pub trait ContentRecord: Send + Sync + Sized {
    type Metadata: Record + 'static;
    /// Field name of the payload, as named in `content_fields`.
    const CONTENT_FIELD: &'static str;

    fn id(&self) -> &str;
    fn format(&self) -> Option<&str>;
    fn content(&self) -> Option<&[u8]>;
    /// `format` is the record's own format string, exactly as given.
    fn to_metadata(&self, format: &str, location: String, location_type: LocationType) -> Self::Metadata;
    fn content_location(metadata: &Self::Metadata) -> Option<&str>;
    fn from_metadata(metadata: Self::Metadata, content: Option<Vec<u8>>) -> Self;
}

/// Collection whose records are split between the metadata index and blob
/// storage.
///
/// Blobs live at `{collection}/{id}.{format}` in the content backend.
pub struct ContentCollection<R: ContentRecord> {
    metadata: DocumentCollection<R::Metadata>,
    content: BackendHandle,
    location_type: LocationType,
    max_concurrency: usize,
}

impl<R: ContentRecord> ContentCollection<R> {
    pub fn new(store: BatchedStore, content: BackendHandle, location_type: LocationType) -> Self {
        Self {
            metadata: DocumentCollection::new(store),
            content,
            location_type,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit the number of blob transfers in flight per call.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata_collection(&self) -> &DocumentCollection<R::Metadata> {
        &self.metadata
    }

    /// The format keeps the caller's spelling (`PNG` stays `PNG`), so blobs
    /// written earlier are found at the same path.
    pub fn content_path(&self, id: &str, format: &str) -> String {
        format!("{}/{id}.{format}", self.name())
    }

    /// Upload every payload, then index the metadata of those that made it.
    ///
    /// Fails before any upload if a record has no supported format. A
    /// payload that fails to upload is logged and its record is left out.
    /// Blobs of records in a skipped metadata batch stay where they are.
    #[instrument(skip_all, fields(collection = %self.name(), items = items.len()))]
    pub async fn insert(&self, items: &[R]) -> Result<Vec<Inserted>> {
        let formats = items
            .iter()
            .map(|item| match item.format() {
                Some(format) => format.parse::<ImageFormat>().map(|_| format),
                None => exn::bail!(ErrorKind::UnsupportedFormat(format!("<none> for {}", item.id()))),
            })
            .collect::<Result<Vec<_>>>()?;

        let uploaded: Vec<(usize, R::Metadata)> = stream::iter(items.iter().zip(formats).enumerate())
            .map(|(index, (item, format))| async move {
                let location = self.content_path(item.id(), format);
                let data = item.content().unwrap_or_default();
                match self.content.upload(Path::new(&location), data).await {
                    Ok(true) => Some((index, item.to_metadata(format, location, self.location_type))),
                    Ok(false) => {
                        tracing::warn!(id = item.id(), %location, "Content was not stored, leaving record out");
                        None
                    }
                    Err(err) => {
                        tracing::warn!(id = item.id(), %location, error = ?err, "Content upload failed, leaving record out");
                        None
                    }
                }
            })
            .buffered(self.max_concurrency)
            .filter_map(std::future::ready)
            .collect()
            .await;

        let (positions, metadata): (Vec<usize>, Vec<R::Metadata>) = uploaded.into_iter().unzip();
        let inserted = self.metadata.insert(&metadata).await?;
        Ok(inserted.into_iter().map(|(i, id)| (positions[i], id)).collect())
    }

    pub async fn insert_single(&self, item: &R) -> Result<Option<String>> {
        let inserted = self.insert(std::slice::from_ref(item)).await?;
        Ok(inserted.into_iter().next().map(|(_, id)| id))
    }

    /// Metadata only, no blob downloads.
    pub async fn fetch_metadata(&self, ids: &[String]) -> Result<Vec<R::Metadata>> {
        self.metadata.fetch(ids).await
    }

    /// Fetch records together with their payloads.
    ///
    /// Ids without metadata are left out. A record whose blob is gone comes
    /// back without content. When `content_fields` is given and does not
    /// name [`ContentRecord::CONTENT_FIELD`], no blob is downloaded.
    #[instrument(skip_all, fields(collection = %self.name(), ids = ids.len()))]
    pub async fn fetch(&self, ids: &[String], content_fields: Option<&[String]>) -> Result<Vec<R>> {
        let metadata = self.fetch_metadata(ids).await?;
        let with_content = content_fields.is_none_or(|fields| fields.iter().any(|f| f == R::CONTENT_FIELD));
        if !with_content {
            return Ok(metadata.into_iter().map(|m| R::from_metadata(m, None)).collect());
        }
        stream::iter(metadata)
            .map(|metadata| async move {
                let content = match R::content_location(&metadata) {
                    Some(location) => self.download(location).await?,
                    None => None,
                };
                Ok::<_, crate::error::Error>(R::from_metadata(metadata, content))
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    pub async fn fetch_single(&self, id: &str) -> Result<Option<R>> {
        Ok(self.fetch(&[id.to_string()], None).await?.into_iter().next())
    }

    async fn download(&self, location: &str) -> Result<Option<Vec<u8>>> {
        match self.content.download(Path::new(location)).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.is_not_found() => {
                tracing::warn!(%location, "Content blob missing, returning record without content");
                Ok(None)
            }
            Err(err) => Err(err).or_raise(|| ErrorKind::Storage),
        }
    }
}

impl<R: ContentRecord> std::fmt::Debug for ContentCollection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCollection")
            .field("metadata", &self.metadata)
            .field("content", &self.content.name())
            .field("location_type", &self.location_type)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawPageMetadataRecord, RawPageRecord};
    use rvs_metadata::backend::MockMetadataBackend;
    use rvs_metadata::error::ErrorKind as MetadataErrorKind;
    use rvs_metadata::RetryPolicy;
    use rvs_storage::backend::MockBackend;
    use rvs_storage::StorageBackend;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn page(id: &str, format: &str, image: Option<&[u8]>) -> RawPageRecord {
        RawPageRecord {
            id: id.to_string(),
            page_hash: Some(format!("hash-{id}")),
            image_format: Some(format.to_string()),
            image: image.map(<[u8]>::to_vec),
            ..Default::default()
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        metadata: Arc<MockMetadataBackend>,
        content: Arc<MockBackend>,
        collection: ContentCollection<RawPageRecord>,
    }

    fn fixture(metadata: MockMetadataBackend, content: MockBackend) -> Fixture {
        let (metadata, content) = (Arc::new(metadata), Arc::new(content));
        let store = BatchedStore::new(metadata.clone(), "raw_page").with_retry(RetryPolicy::none());
        let collection = ContentCollection::new(store, content.clone(), LocationType::File).with_max_concurrency(4);
        Fixture { metadata, content, collection }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default());
        let pages = vec![page("p1", "PNG", Some(b"png bytes")), page("p2", "jpeg", Some(b"jpeg bytes"))];
        let inserted = f.collection.insert(&pages).await.unwrap();
        assert_eq!(inserted, vec![(0, "p1".to_string()), (1, "p2".to_string())]);
        assert_eq!(f.content.paths(), vec![PathBuf::from("raw_page/p1.PNG"), PathBuf::from("raw_page/p2.jpeg")]);

        let fetched = f.collection.fetch(&ids(&["p2", "p1"]), None).await.unwrap();
        assert_eq!(fetched[0].image.as_deref(), Some(&b"jpeg bytes"[..]));
        assert_eq!(fetched[1].image.as_deref(), Some(&b"png bytes"[..]));
        assert_eq!(fetched[1].image_format.as_deref(), Some("PNG"));
        assert_eq!(fetched[1].page_hash.as_deref(), Some("hash-p1"));

        let metadata: Vec<RawPageMetadataRecord> = f.collection.fetch_metadata(&ids(&["p1"])).await.unwrap();
        assert_eq!(metadata[0].content_location.as_deref(), Some("raw_page/p1.PNG"));
        assert_eq!(metadata[0].location_type, Some(LocationType::File));
    }

    #[tokio::test]
    async fn test_missing_image_is_empty_blob() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default());
        f.collection.insert(&[page("p1", "tif", None)]).await.unwrap();
        let fetched = f.collection.fetch_single("p1").await.unwrap().unwrap();
        assert_eq!(fetched.image.as_deref(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_before_upload() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default());
        let err = f.collection.insert(&[page("p1", "png", None), page("p2", "gif", None)]).await.unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat("gif".to_string()));
        assert_eq!(f.content.uploads(), 0);
        assert!(f.metadata.attempts().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_is_left_out() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default().fail_on("raw_page/p2.png"));
        let pages = vec![page("p1", "png", None), page("p2", "png", None), page("p3", "png", None)];
        let inserted = f.collection.insert(&pages).await.unwrap();
        assert_eq!(inserted, vec![(0, "p1".to_string()), (2, "p3".to_string())]);
        assert_eq!(f.metadata.len("raw_page").await, 2);
    }

    #[tokio::test]
    async fn test_skipped_batch_keeps_indices() {
        let metadata = MockMetadataBackend::new(2).fail_commits_containing("p3", MetadataErrorKind::Database, usize::MAX);
        let f = fixture(metadata, MockBackend::default());
        let pages: Vec<_> = (1..=5).map(|i| page(&format!("p{i}"), "png", None)).collect();
        let inserted = f.collection.insert(&pages).await.unwrap();
        assert_eq!(inserted, vec![(0, "p1".to_string()), (1, "p2".to_string()), (4, "p5".to_string())]);
        // Blobs of the skipped batch are not rolled back.
        assert_eq!(f.content.paths().len(), 5);
    }

    #[tokio::test]
    async fn test_absent_ids_and_missing_blobs() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default());
        f.collection.insert(&[page("p1", "png", Some(b"x")), page("p2", "png", Some(b"y"))]).await.unwrap();
        f.content.delete(Path::new("raw_page/p2.png")).await.unwrap();

        let fetched = f.collection.fetch(&ids(&["p1", "nope", "p2"]), None).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].image.as_deref(), Some(&b"x"[..]));
        assert_eq!(fetched[1].id, "p2");
        assert!(fetched[1].image.is_none());
    }

    #[tokio::test]
    async fn test_content_fields_skip_downloads() {
        let f = fixture(MockMetadataBackend::new(500), MockBackend::default());
        f.collection.insert(&[page("p1", "png", Some(b"x"))]).await.unwrap();

        let fetched = f.collection.fetch(&ids(&["p1"]), Some(&ids(&["page_hash"]))).await.unwrap();
        assert!(fetched[0].image.is_none());
        assert_eq!(f.content.downloads(), 0);

        let fetched = f.collection.fetch(&ids(&["p1"]), Some(&ids(&["image"]))).await.unwrap();
        assert_eq!(fetched[0].image.as_deref(), Some(&b"x"[..]));
        assert_eq!(f.content.downloads(), 1);
    }
}
