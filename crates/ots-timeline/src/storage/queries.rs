//! Database queries for the `deployments` and `image_aliases` tables.

use sqlx::SqliteConnection;
use tracing::debug;

use super::db::{DatabaseError, TimelineDb};
use super::models::{ALIAS_CURRENT, ALIAS_ROLLBACK, Deployment, DeploymentAction, ImageAlias, ImageRef};

/// Fields of a deployment record about to be appended.
///
/// `new` fills the common case: no port, successful, no notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDeployment<'a> {
    pub image: &'a str,
    pub tag: &'a str,
    pub action: DeploymentAction,
    pub port: Option<u16>,
    pub success: bool,
    pub notes: Option<&'a str>,
}

impl<'a> NewDeployment<'a> {
    pub const fn new(image: &'a str, tag: &'a str, action: DeploymentAction) -> Self {
        Self {
            image,
            tag,
            action,
            port: None,
            success: true,
            notes: None,
        }
    }

    /// Target a single running instance.
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub const fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub const fn failed(self) -> Self {
        self.success(false)
    }

    pub const fn notes(mut self, notes: &'a str) -> Self {
        self.notes = Some(notes);
        self
    }
}

/// Alias names are stored upper-case; lookups go through the same mapping.
pub(super) fn normalize_alias(alias: &str) -> String {
    alias.to_uppercase()
}

/// Append a deployment record on an existing connection or transaction.
pub(super) async fn insert_deployment(
    conn: &mut SqliteConnection,
    new: &NewDeployment<'_>,
) -> Result<i64, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO deployments (port, image, tag, action, success, notes) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new.port.map(i64::from))
    .bind(new.image)
    .bind(new.tag)
    .bind(new.action.as_str())
    .bind(new.success)
    .bind(new.notes)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Create or overwrite an alias on an existing connection or transaction.
pub(super) async fn upsert_alias(
    conn: &mut SqliteConnection,
    alias: &str,
    image: &str,
    tag: &str,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r"
        INSERT INTO image_aliases (alias, image, tag, set_at)
        VALUES (?, ?, ?, datetime('now'))
        ON CONFLICT(alias) DO UPDATE SET
            image = excluded.image,
            tag = excluded.tag,
            set_at = datetime('now')
        ",
    )
    .bind(normalize_alias(alias))
    .bind(image)
    .bind(tag)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Look up an alias on an existing connection or transaction.
pub(super) async fn fetch_alias(
    conn: &mut SqliteConnection,
    alias: &str,
) -> Result<Option<ImageAlias>, DatabaseError> {
    let row = sqlx::query_as::<_, ImageAlias>(
        "SELECT alias, image, tag, set_at FROM image_aliases WHERE alias = ?",
    )
    .bind(normalize_alias(alias))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

impl TimelineDb {
    // =========================================================================
    // Deployment timeline
    // =========================================================================

    /// Append a deployment action to the timeline. Returns the new record id.
    pub async fn record_deployment(&self, new: &NewDeployment<'_>) -> Result<i64, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        let id = insert_deployment(&mut conn, new).await?;

        debug!(
            id,
            image = new.image,
            tag = new.tag,
            action = %new.action,
            port = ?new.port,
            success = new.success,
            "Recorded deployment"
        );
        Ok(id)
    }

    /// Most recent `limit` records, newest first, optionally for one port.
    ///
    /// Records without a port never match a port filter.
    pub async fn get_deployments(
        &self,
        limit: u32,
        port: Option<u16>,
    ) -> Result<Vec<Deployment>, DatabaseError> {
        let deployments = if let Some(port) = port {
            sqlx::query_as::<_, Deployment>(
                r"
                SELECT id, timestamp, port, image, tag, action, success, notes
                FROM deployments
                WHERE port = ?
                ORDER BY id DESC
                LIMIT ?
                ",
            )
            .bind(i64::from(port))
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, Deployment>(
                r"
                SELECT id, timestamp, port, image, tag, action, success, notes
                FROM deployments
                ORDER BY id DESC
                LIMIT ?
                ",
            )
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        };

        Ok(deployments)
    }

    // =========================================================================
    // Image aliases
    // =========================================================================

    /// Point an alias at `(image, tag)`, creating it if absent.
    pub async fn set_alias(&self, alias: &str, image: &str, tag: &str) -> Result<(), DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        upsert_alias(&mut conn, alias, image, tag).await?;

        debug!(alias = %normalize_alias(alias), image, tag, "Alias set");
        Ok(())
    }

    /// Case-insensitive alias lookup.
    pub async fn get_alias(&self, alias: &str) -> Result<Option<ImageAlias>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_alias(&mut conn, alias).await
    }

    /// Every alias, ordered by name.
    pub async fn get_all_aliases(&self) -> Result<Vec<ImageAlias>, DatabaseError> {
        let aliases = sqlx::query_as::<_, ImageAlias>(
            "SELECT alias, image, tag, set_at FROM image_aliases ORDER BY alias",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(aliases)
    }

    /// The image the CURRENT alias points at.
    pub async fn get_current_image(&self) -> Result<Option<ImageRef>, DatabaseError> {
        Ok(self.get_alias(ALIAS_CURRENT).await?.map(ImageRef::from))
    }

    /// The image the ROLLBACK alias points at.
    pub async fn get_rollback_image(&self) -> Result<Option<ImageRef>, DatabaseError> {
        Ok(self.get_alias(ALIAS_ROLLBACK).await?.map(ImageRef::from))
    }
}
