use crate::backend::MetadataBackend;
use crate::db::Database;
use crate::document::Document;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use rvs_config::{DEFAULT_MAX_BATCH_SIZE, MetadataSettings};
use std::collections::HashMap;
use time::UtcDateTime;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    body: String,
}
impl TryFrom<DocumentRow> for Document {
    type Error = crate::error::Error;
    fn try_from(row: DocumentRow) -> Result<Self> {
        Document::from_body(row.id, &row.body)
    }
}

/// Metadata index stored in a single SQLite table.
///
/// A batch is committed inside one transaction. Lock contention is reported
/// as [`ErrorKind::Transient`].
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    name: String,
    db: Database,
    max_batch_size: usize,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self { name: "sqlite".to_string(), db, max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Open the configured database file, or an in-memory index when none
    /// is configured.
    pub async fn from_config(settings: &MetadataSettings) -> Result<Self> {
        let db = match &settings.database {
            Some(path) => Database::connect(path).await?,
            None => {
                tracing::debug!("No metadata database configured, using an in-memory index");
                Database::connect_in_memory().await?
            }
        };
        Ok(Self::new(db).with_max_batch_size(settings.max_batch_size))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn limit(limit: usize) -> Result<i64> {
        i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))
    }
}

#[async_trait]
impl MetadataBackend for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[instrument(skip(self, batch), fields(size = batch.len()))]
    async fn commit(&self, collection: &str, batch: &[Document]) -> Result<()> {
        if batch.len() > self.max_batch_size {
            exn::bail!(ErrorKind::BatchTooLarge { size: batch.len(), limit: self.max_batch_size });
        }
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.db.pool().begin().await.map_err(ErrorKind::sqlx)?;
        for document in batch {
            sqlx::query(include_str!("../../queries/upsert_document.sql"))
                .bind(collection)
                .bind(&document.id)
                .bind(document.body()?)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(ErrorKind::sqlx)?;
        }
        tx.commit().await.map_err(ErrorKind::sqlx)?;
        Ok(())
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted = serde_json::to_string(ids).or_raise(|| ErrorKind::InvalidData("document ids"))?;
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../../queries/get_documents.sql"))
            .bind(collection)
            .bind(wanted)
            .fetch_all(self.db.pool())
            .await
            .map_err(ErrorKind::sqlx)?;
        let mut found = rows
            .into_iter()
            .map(|row| Document::try_from(row).map(|d| (d.id.clone(), d)))
            .collect::<Result<HashMap<_, _>>>()?;
        // Request order, and a repeated id is returned once.
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn list_ids(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(include_str!("../../queries/list_ids.sql"))
            .bind(collection)
            .bind(after)
            .bind(Self::limit(limit)?)
            .fetch_all(self.db.pool())
            .await
            .map_err(ErrorKind::sqlx)?;
        Ok(ids)
    }

    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
        fields: Option<&[String]>,
    ) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../../queries/scan_documents.sql"))
            .bind(collection)
            .bind(after)
            .bind(Self::limit(limit)?)
            .fetch_all(self.db.pool())
            .await
            .map_err(ErrorKind::sqlx)?;
        rows.into_iter()
            .map(|row| {
                let document = Document::try_from(row)?;
                Ok(match fields {
                    Some(fields) => document.project(fields),
                    None => document,
                })
            })
            .collect()
    }
}
