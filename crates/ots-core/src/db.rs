//! Shared database types and utilities.
//!
//! Provides `DatabaseError` and the pool creation helpers used by the
//! timeline storage layer.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Storage errors. Every failure to open, migrate, read or write the
/// store surfaces as one of these.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Open (or create) a `SQLite` connection pool at the given file path.
///
/// Creates the parent directory if it does not exist, enables WAL journal
/// mode, foreign keys, and sets a 5-second busy timeout so concurrent
/// writers from other processes wait for the file lock instead of failing.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    info!(path = %path.display(), "Database opened");

    Ok(pool)
}

/// Open an in-memory `SQLite` connection pool (for testing).
///
/// Limited to a single connection that is never recycled: every new
/// connection would see its own empty database.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, DatabaseError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    Ok(pool)
}

/// Macro to define a `Database`-like struct with `open`, `open_in_memory`,
/// `run_migrations`, and `pool` methods.
///
/// Usage:
/// ```ignore
/// ots_core::define_database!(TimelineDb, "Timeline database migrations complete");
/// ```
///
/// Migrations are embedded from the `migrations/` directory of the crate
/// invoking the macro. The generated struct has:
/// - `pub async fn open(path: &Path) -> Result<Self, DatabaseError>`
/// - `pub async fn open_in_memory() -> Result<Self, DatabaseError>`
/// - `async fn run_migrations(&self) -> Result<(), DatabaseError>`
/// - `pub const fn pool(&self) -> &Pool<Sqlite>`
/// - `pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, DatabaseError>`
/// - `pub async fn close(&self)`
#[macro_export]
macro_rules! define_database {
    ($name:ident, $migration_msg:expr) => {
        #[derive(Clone)]
        pub struct $name {
            pool: ::sqlx::Pool<::sqlx::Sqlite>,
        }

        impl $name {
            /// Open or create a database at the given path.
            pub async fn open(
                path: &::std::path::Path,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                let pool = $crate::db::open_pool(path).await?;
                let db = Self { pool };
                db.run_migrations().await?;
                Ok(db)
            }

            /// Open an in-memory database (for testing).
            pub async fn open_in_memory() -> ::std::result::Result<Self, $crate::db::DatabaseError>
            {
                let pool = $crate::db::open_pool_in_memory().await?;
                let db = Self { pool };
                db.run_migrations().await?;
                Ok(db)
            }

            /// Run database migrations.
            async fn run_migrations(&self) -> ::std::result::Result<(), $crate::db::DatabaseError> {
                ::sqlx::migrate!("./migrations")
                    .run(&self.pool)
                    .await
                    .map_err(|e| $crate::db::DatabaseError::Migration(e.to_string()))?;

                ::tracing::info!($migration_msg);
                Ok(())
            }

            /// Get a reference to the connection pool.
            pub const fn pool(&self) -> &::sqlx::Pool<::sqlx::Sqlite> {
                &self.pool
            }

            /// Start a transaction that holds the write lock from its first
            /// statement (`BEGIN IMMEDIATE`).
            ///
            /// A deferred transaction that reads before writing cannot wait
            /// for the lock: SQLite fails the upgrade with `SQLITE_BUSY` while
            /// another connection holds a snapshot. Taking the lock up front
            /// makes other writers queue behind the busy timeout instead.
            pub async fn begin_write(
                &self,
            ) -> ::std::result::Result<
                ::sqlx::Transaction<'static, ::sqlx::Sqlite>,
                $crate::db::DatabaseError,
            > {
                Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
            }

            /// Close every pooled connection, releasing the file handle.
            pub async fn close(&self) {
                self.pool.close().await;
            }
        }
    };
}
