//! SQLite connection pool for the metadata index.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Readers share the file with the single WAL writer during collection scans.
const FILE_CONNECTIONS: u32 = 4;
/// Short, so that lock contention comes back as a transient error for the
/// batch retry policy to handle.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection pool with the `documents` schema applied.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the index at `path` and run migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let target = SqliteConnectOptions::new().filename(path.as_ref()).create_if_missing(true);
        Self::open(target, FILE_CONNECTIONS).await
    }

    /// Open a private in-memory index.
    ///
    /// Pinned to one connection: each extra connection would open its own
    /// empty database. Other crates use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(SqliteConnectOptions::new().in_memory(true), 1).await
    }

    async fn open(target: SqliteConnectOptions, connections: u32) -> Result<Self> {
        // Connect options apply to every connection the pool opens.
        let options = target
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("wal_autocheckpoint", "1000")
            .pragma("cache_size", "-16384")
            .pragma("temp_store", "MEMORY");
        // Never recycle connections: an in-memory index lives and dies with
        // its only connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(ErrorKind::sqlx)?;
        let database = Self { pool };
        database.migrate().await?;
        tracing::debug!(connections, "Metadata index ready");
        Ok(database)
    }

    #[instrument("migrating metadata index", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool after letting SQLite refresh its planner statistics.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
