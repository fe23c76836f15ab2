//! SQLite connection pool holding the pattern index.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Readers for concurrent cache misses; writes are serialized by SQLite.
const FILE_CONNECTIONS: u32 = 5;
/// How long a writer waits for a rebuild transaction to commit.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on the index database.
///
/// Cheap to clone; every clone shares the same pool. The schema is migrated
/// when the database is opened, so an [`Index`](crate::Index) built on top of
/// it can be queried straight away (an index that was never built simply has
/// no records and no version).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the index stored at `path`, creating the file and any missing
    /// parent directories.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // Lookups keep reading the live table while a rebuild writes the
            // next one.
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(async move { Self::tune(conn, meta).await }))
            .max_connections(FILE_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::open(pool).await
    }

    /// Open a private in-memory index.
    ///
    /// Not limited to `#[cfg(test)]`: dependent crates use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:").busy_timeout(BUSY_TIMEOUT);
        // Every connection to ":memory:" gets a database of its own, and the
        // database is gone once its connection closes. Pin exactly one.
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(async move { Self::tune(conn, meta).await }))
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::open(pool).await
    }

    async fn open(pool: SqlitePool) -> Result<Self> {
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!(connections = pool.size(), "Opened index database");
        Ok(Self { pool })
    }

    // Query-based settings have to be applied to every pooled connection, not
    // just the first one.
    async fn tune(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA temp_store = MEMORY;
                PRAGMA cache_size = -16384;
                PRAGMA mmap_size = 67108864;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for outstanding queries, then close every connection.
    pub async fn close(&self) {
        // A rebuild replaces the whole table; refresh the planner statistics.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
