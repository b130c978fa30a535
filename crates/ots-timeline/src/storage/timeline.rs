//! Alias transitions derived from the deployment timeline.
//!
//! `set_current` is the plain pointer swap. `rollback` ranks the distinct
//! `(image, tag)` pairs that were put live by their most recent record id
//! and moves CURRENT to the second one. Both run in a single write
//! transaction so the aliases never disagree with the appended record, and
//! concurrent callers on the same file take turns.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::db::{DatabaseError, TimelineDb};
use super::models::{ALIAS_CURRENT, ALIAS_ROLLBACK, DeploymentAction, ImageRef, PreviousTag};
use super::queries::{NewDeployment, fetch_alias, insert_deployment, normalize_alias, upsert_alias};

/// Distinct live pairs ranked by their latest record id. Record ids, not
/// timestamps, order history: `datetime('now')` only has second precision.
const LIVE_PAIRS_SQL: &str = r"
    SELECT image, tag
    FROM deployments
    WHERE success = 1
      AND action IN (?, ?, ?)
    GROUP BY image, tag
    ORDER BY MAX(id) DESC
    LIMIT ?
";

const PREVIOUS_TAGS_SQL: &str = r"
    SELECT image, tag, MAX(timestamp) AS last_used
    FROM deployments
    WHERE success = 1
      AND action IN (?, ?, ?)
    GROUP BY image, tag
    ORDER BY MAX(id) DESC
    LIMIT ?
";

async fn live_pairs(conn: &mut SqliteConnection, limit: u32) -> Result<Vec<ImageRef>, DatabaseError> {
    let mut query = sqlx::query_as::<_, ImageRef>(LIVE_PAIRS_SQL);
    for action in DeploymentAction::LIVE {
        query = query.bind(action.as_str());
    }
    let pairs = query.bind(limit).fetch_all(&mut *conn).await?;
    Ok(pairs)
}

impl TimelineDb {
    /// Point CURRENT at `(image, tag)`, moving the old CURRENT to ROLLBACK.
    ///
    /// Returns the previous CURRENT tag, or `None` when CURRENT was unset.
    pub async fn set_current(&self, image: &str, tag: &str) -> Result<Option<String>, DatabaseError> {
        let mut tx = self.begin_write().await?;

        let previous = fetch_alias(&mut tx, ALIAS_CURRENT).await?;
        if let Some(prev) = &previous {
            upsert_alias(&mut tx, ALIAS_ROLLBACK, &prev.image, &prev.tag).await?;
        }
        upsert_alias(&mut tx, ALIAS_CURRENT, image, tag).await?;

        let notes = previous
            .as_ref()
            .map_or_else(|| "Initial current".to_string(), |p| format!("Previous: {}", p.tag));
        let id = insert_deployment(
            &mut tx,
            &NewDeployment::new(image, tag, DeploymentAction::SetCurrent).notes(&notes),
        )
        .await?;

        tx.commit().await?;

        let previous_tag = previous.map(|p| p.tag);
        info!(id, image, tag, previous = ?previous_tag, "CURRENT alias set");
        Ok(previous_tag)
    }

    /// Move CURRENT to the last different artifact that was live.
    ///
    /// The target comes from history, not from the ROLLBACK alias. ROLLBACK
    /// receives whatever CURRENT held before the call, even if that differs
    /// from the most recent live pair. Rollback records are not live
    /// actions, so a second call without a deploy in between ranks the same
    /// history and lands on the same target. Returns `None` and changes
    /// nothing when fewer than two distinct pairs were ever live.
    pub async fn rollback(&self) -> Result<Option<ImageRef>, DatabaseError> {
        let mut tx = self.begin_write().await?;

        let ranked = live_pairs(&mut tx, 2).await?;
        let (Some(latest), Some(target)) = (ranked.first(), ranked.get(1)) else {
            debug!(distinct = ranked.len(), "Nothing to roll back to");
            return Ok(None);
        };

        let current = fetch_alias(&mut tx, ALIAS_CURRENT).await?;
        if let Some(cur) = &current {
            if cur.image != latest.image || cur.tag != latest.tag {
                debug!(
                    alias = %ImageRef::from(cur.clone()),
                    history = %latest,
                    "CURRENT alias differs from latest live deployment"
                );
            }
            upsert_alias(&mut tx, ALIAS_ROLLBACK, &cur.image, &cur.tag).await?;
        }
        upsert_alias(&mut tx, ALIAS_CURRENT, &target.image, &target.tag).await?;

        let from_tag = current.as_ref().map_or("unknown", |c| c.tag.as_str());
        let notes = format!("Rolled back from {from_tag}");
        let id = insert_deployment(
            &mut tx,
            &NewDeployment::new(&target.image, &target.tag, DeploymentAction::Rollback).notes(&notes),
        )
        .await?;

        tx.commit().await?;

        info!(id, image = %target.image, tag = %target.tag, from = from_tag, "Rolled back");
        Ok(Some(target.clone()))
    }

    /// Distinct live pairs, most recently live first. Rollback candidates
    /// for display; nothing is modified.
    pub async fn get_previous_tags(&self, limit: u32) -> Result<Vec<PreviousTag>, DatabaseError> {
        let mut query = sqlx::query_as::<_, PreviousTag>(PREVIOUS_TAGS_SQL);
        for action in DeploymentAction::LIVE {
            query = query.bind(action.as_str());
        }
        let tags = query.bind(limit).fetch_all(self.pool()).await?;
        Ok(tags)
    }

    /// Translate a tag that may name an alias (`current`, `rollback`, ...)
    /// into a concrete image reference.
    ///
    /// A tag naming a stored alias resolves to that alias. CURRENT or
    /// ROLLBACK while unset resolve to `None`. Any other tag is a concrete
    /// version and pairs with `image` unchanged.
    pub async fn resolve_image(&self, image: &str, tag: &str) -> Result<Option<ImageRef>, DatabaseError> {
        if let Some(alias) = self.get_alias(tag).await? {
            debug!(tag, image = %alias.image, resolved = %alias.tag, "Resolved alias");
            return Ok(Some(alias.into()));
        }

        let name = normalize_alias(tag);
        if name == ALIAS_CURRENT || name == ALIAS_ROLLBACK {
            return Ok(None);
        }
        Ok(Some(ImageRef::new(image, tag)))
    }
}
