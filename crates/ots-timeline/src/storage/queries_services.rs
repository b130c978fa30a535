//! Database queries for `service_instances` and `service_actions` tables.
//!
//! Instances are a registry keyed on `(package, instance)`, e.g.
//! `("valkey", "6379")` for a `valkey-server@6379` template unit. Actions
//! are an append-only audit trail like the deployment timeline.

use tracing::debug;

use super::db::{DatabaseError, TimelineDb};
use super::models::{ServiceAction, ServiceInstance};

/// Registry fields for a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInstanceParams<'a> {
    pub package: &'a str,
    pub instance: &'a str,
    pub config_file: &'a str,
    pub data_dir: &'a str,
    pub port: Option<u16>,
    pub notes: Option<&'a str>,
}

impl TimelineDb {
    // =========================================================================
    // Service instance registry
    // =========================================================================

    /// Register a service instance, or refresh its fields if already known.
    ///
    /// `created_at` survives re-registration; `updated_at` is bumped.
    pub async fn record_service_instance(
        &self,
        params: &ServiceInstanceParams<'_>,
    ) -> Result<i64, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO service_instances (package, instance, config_file, data_dir, port, notes)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(package, instance) DO UPDATE SET
                config_file = excluded.config_file,
                data_dir = excluded.data_dir,
                port = excluded.port,
                notes = excluded.notes,
                updated_at = datetime('now')
            RETURNING id
            ",
        )
        .bind(params.package)
        .bind(params.instance)
        .bind(params.config_file)
        .bind(params.data_dir)
        .bind(params.port.map(i64::from))
        .bind(params.notes)
        .fetch_one(self.pool())
        .await?;

        debug!(id, package = params.package, instance = params.instance, "Service instance recorded");
        Ok(id)
    }

    /// Get a service instance by package and instance name.
    pub async fn get_service_instance(
        &self,
        package: &str,
        instance: &str,
    ) -> Result<Option<ServiceInstance>, DatabaseError> {
        let row = sqlx::query_as::<_, ServiceInstance>(
            r"
            SELECT id, package, instance, config_file, data_dir, port, created_at, updated_at, notes
            FROM service_instances
            WHERE package = ? AND instance = ?
            ",
        )
        .bind(package)
        .bind(instance)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// List service instances, optionally for one package.
    pub async fn get_service_instances(
        &self,
        package: Option<&str>,
    ) -> Result<Vec<ServiceInstance>, DatabaseError> {
        let rows = if let Some(pkg) = package {
            sqlx::query_as::<_, ServiceInstance>(
                r"
                SELECT id, package, instance, config_file, data_dir, port, created_at, updated_at, notes
                FROM service_instances
                WHERE package = ?
                ORDER BY package, instance
                ",
            )
            .bind(pkg)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, ServiceInstance>(
                r"
                SELECT id, package, instance, config_file, data_dir, port, created_at, updated_at, notes
                FROM service_instances
                ORDER BY package, instance
                ",
            )
            .fetch_all(self.pool())
            .await?
        };

        Ok(rows)
    }

    /// Remove a service instance from the registry. Its audit trail stays.
    pub async fn delete_service_instance(
        &self,
        package: &str,
        instance: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM service_instances WHERE package = ? AND instance = ?")
            .bind(package)
            .bind(instance)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Service action audit trail
    // =========================================================================

    /// Append a service action (init, enable, start, secret-set, ...).
    pub async fn record_service_action(
        &self,
        package: &str,
        instance: &str,
        action: &str,
        success: bool,
        notes: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO service_actions (package, instance, action, success, notes) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(package)
        .bind(instance)
        .bind(action)
        .bind(success)
        .bind(notes)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Service action history, newest first.
    ///
    /// `instance` only narrows the result when `package` is also given.
    pub async fn get_service_actions(
        &self,
        package: Option<&str>,
        instance: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ServiceAction>, DatabaseError> {
        let rows = match (package, instance) {
            (Some(pkg), Some(inst)) => {
                sqlx::query_as::<_, ServiceAction>(
                    r"
                    SELECT id, timestamp, package, instance, action, success, notes
                    FROM service_actions
                    WHERE package = ? AND instance = ?
                    ORDER BY id DESC
                    LIMIT ?
                    ",
                )
                .bind(pkg)
                .bind(inst)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            (Some(pkg), None) => {
                sqlx::query_as::<_, ServiceAction>(
                    r"
                    SELECT id, timestamp, package, instance, action, success, notes
                    FROM service_actions
                    WHERE package = ?
                    ORDER BY id DESC
                    LIMIT ?
                    ",
                )
                .bind(pkg)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            (None, _) => {
                sqlx::query_as::<_, ServiceAction>(
                    r"
                    SELECT id, timestamp, package, instance, action, success, notes
                    FROM service_actions
                    ORDER BY id DESC
                    LIMIT ?
                    ",
                )
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows)
    }
}
