//! Image subcommands: history, aliases, set-current, rollback, previous,
//! record, resolve.
//!
//! User-facing output uses writeln! to the given writer (stdout in the
//! binary, a buffer in tests).

use std::io::{self, Write};

use anyhow::Context;

use ots_timeline::{DeploymentAction, NewDeployment, TimelineDb};

use crate::Outcome;

const RULE_WIDE: usize = 80;
const RULE_NARROW: usize = 60;
const TAG_COLUMN: usize = 15;

/// Image subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum ImageCommand {
    /// Show the deployment timeline.
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u32,
        /// Only show records for this instance port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show image aliases and what `current` / `rollback` resolve to.
    Aliases,
    /// Set the CURRENT alias. The previous CURRENT becomes ROLLBACK.
    SetCurrent {
        /// Tag to set as CURRENT
        tag: String,
        /// Full image path (defaults to the configured image)
        #[arg(short, long)]
        image: Option<String>,
    },
    /// Roll back to the previous distinct deployment in the timeline.
    Rollback,
    /// List rollback candidates, most recently deployed first.
    Previous {
        /// Number of candidates to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: u32,
    },
    /// Record a deployment action performed by the orchestrator.
    Record {
        /// deploy, redeploy, undeploy, rollback or set-current
        action: DeploymentAction,
        /// Tag that was acted on
        tag: String,
        /// Full image path (defaults to the configured image)
        #[arg(short, long)]
        image: Option<String>,
        /// Instance port the action targeted
        #[arg(short, long)]
        port: Option<u16>,
        /// Mark the action as failed
        #[arg(long)]
        failed: bool,
        /// Free-text context
        #[arg(long)]
        notes: Option<String>,
    },
    /// Resolve a tag or alias (`current`, `rollback`) to `image:tag`.
    Resolve {
        /// Tag or alias name
        tag: String,
        /// Image paired with concrete tags (defaults to the configured image)
        #[arg(short, long)]
        image: Option<String>,
    },
}

/// Execute an image subcommand.
pub async fn run(
    command: ImageCommand,
    db: &TimelineDb,
    default_image: &str,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    match command {
        ImageCommand::History { limit, port } => history(db, limit, port, out).await,
        ImageCommand::Aliases => aliases(db, out).await,
        ImageCommand::SetCurrent { tag, image } => {
            set_current(db, image.as_deref().unwrap_or(default_image), &tag, out).await
        }
        ImageCommand::Rollback => rollback(db, out).await,
        ImageCommand::Previous { limit } => previous(db, limit, out).await,
        ImageCommand::Record {
            action,
            tag,
            image,
            port,
            failed,
            notes,
        } => {
            let mut new = NewDeployment::new(image.as_deref().unwrap_or(default_image), &tag, action)
                .success(!failed);
            if let Some(port) = port {
                new = new.port(port);
            }
            if let Some(notes) = notes.as_deref() {
                new = new.notes(notes);
            }
            record(db, &new, out).await
        }
        ImageCommand::Resolve { tag, image } => {
            resolve(db, image.as_deref().unwrap_or(default_image), &tag, out).await
        }
    }
}

/// Shorten long tags so the history table stays aligned.
fn truncate_tag(tag: &str) -> String {
    if tag.chars().count() <= TAG_COLUMN {
        tag.to_string()
    } else {
        let head: String = tag.chars().take(TAG_COLUMN - 3).collect();
        format!("{head}...")
    }
}

async fn history(
    db: &TimelineDb,
    limit: u32,
    port: Option<u16>,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    let deployments = db
        .get_deployments(limit, port)
        .await
        .context("Failed to read deployment history")?;

    if deployments.is_empty() {
        writeln!(out, "No deployments recorded yet.")?;
        return Ok(Outcome::Done);
    }

    let aliases = db.get_all_aliases().await.context("Failed to read aliases")?;
    if !aliases.is_empty() {
        writeln!(out, "Current aliases:")?;
        for alias in &aliases {
            writeln!(out, "  {}: {}:{}", alias.alias, alias.image, alias.tag)?;
        }
        writeln!(out)?;
    }

    match port {
        Some(port) => writeln!(out, "Deployment history (port {port}):")?,
        None => writeln!(out, "Deployment history:")?,
    }
    let rule = "-".repeat(RULE_WIDE);
    writeln!(out, "{rule}")?;
    writeln!(
        out,
        "{:>4}  {:<20}  {:>5}  {:<12}  {:<15}  Status",
        "ID", "Timestamp", "Port", "Action", "Tag"
    )?;
    writeln!(out, "{rule}")?;

    for d in &deployments {
        let port = d.port.map_or_else(|| "-".to_string(), |p| p.to_string());
        let status = if d.success { "OK" } else { "FAIL" };
        writeln!(
            out,
            "{:>4}  {:<20}  {:>5}  {:<12}  {:<15}  {}",
            d.id,
            d.timestamp,
            port,
            d.action,
            truncate_tag(&d.tag),
            status
        )?;
    }

    writeln!(out, "{rule}")?;
    writeln!(out, "Showing {} of {limit} max entries", deployments.len())?;
    Ok(Outcome::Done)
}

async fn aliases(db: &TimelineDb, out: &mut impl Write) -> anyhow::Result<Outcome> {
    let aliases = db.get_all_aliases().await.context("Failed to read aliases")?;

    if aliases.is_empty() {
        writeln!(out, "No aliases configured.")?;
        writeln!(out)?;
        writeln!(out, "Set an alias with: ots image set-current <tag>")?;
        return Ok(Outcome::Done);
    }

    let rule = "-".repeat(RULE_NARROW);
    writeln!(out, "Image aliases:")?;
    writeln!(out, "{rule}")?;
    for alias in &aliases {
        writeln!(out, "  {}:", alias.alias)?;
        writeln!(out, "    Image: {}:{}", alias.image, alias.tag)?;
        writeln!(out, "    Set:   {}", alias.set_at)?;
    }
    writeln!(out, "{rule}")?;

    writeln!(out)?;
    writeln!(out, "Resolution:")?;
    if let Some(current) = db.get_current_image().await? {
        writeln!(out, "  TAG=current  -> {current}")?;
    }
    if let Some(rollback) = db.get_rollback_image().await? {
        writeln!(out, "  TAG=rollback -> {rollback}")?;
    }
    Ok(Outcome::Done)
}

async fn set_current(
    db: &TimelineDb,
    image: &str,
    tag: &str,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    let previous = db
        .set_current(image, tag)
        .await
        .context("Failed to set CURRENT alias")?;

    writeln!(out, "CURRENT set to {image}:{tag}")?;
    match previous {
        Some(prev) => writeln!(out, "ROLLBACK set to previous: {prev}")?,
        None => writeln!(out, "(No previous CURRENT to roll back to)")?,
    }
    Ok(Outcome::Done)
}

async fn rollback(db: &TimelineDb, out: &mut impl Write) -> anyhow::Result<Outcome> {
    let Some(current) = db.get_current_image().await? else {
        writeln!(out, "No CURRENT alias set")?;
        return Ok(Outcome::NothingToDo);
    };
    writeln!(out, "Current: {current}")?;

    let candidates = db.get_previous_tags(5).await?;
    let Some(target) = candidates.get(1) else {
        writeln!(out, "No previous deployment to roll back to")?;
        return Ok(Outcome::NothingToDo);
    };
    writeln!(out)?;
    writeln!(out, "Rolling back to: {}", target.image_ref())?;
    writeln!(out, "  (last deployed: {})", target.last_used)?;

    let Some(new_current) = db.rollback().await.context("Rollback failed")? else {
        writeln!(out, "Rollback failed - no previous deployment found")?;
        return Ok(Outcome::NothingToDo);
    };

    writeln!(out)?;
    writeln!(out, "Rollback complete!")?;
    writeln!(out, "  CURRENT: {new_current}")?;
    writeln!(out, "  ROLLBACK: {current}")?;
    writeln!(out)?;
    writeln!(out, "Redeploy the instances to apply.")?;
    Ok(Outcome::Done)
}

async fn previous(db: &TimelineDb, limit: u32, out: &mut impl Write) -> anyhow::Result<Outcome> {
    let candidates = db.get_previous_tags(limit).await?;

    if candidates.is_empty() {
        writeln!(out, "No successful deployments recorded yet.")?;
        return Ok(Outcome::Done);
    }

    writeln!(out, "Previously deployed images (most recent first):")?;
    for (rank, candidate) in candidates.iter().enumerate() {
        let marker = if rank == 1 { "<- rollback target" } else { "" };
        writeln!(
            out,
            "  {:<60}  {:<20}  {}",
            candidate.image_ref().to_string(),
            candidate.last_used,
            marker
        )?;
    }
    Ok(Outcome::Done)
}

async fn record(
    db: &TimelineDb,
    new: &NewDeployment<'_>,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    let id = db
        .record_deployment(new)
        .await
        .context("Failed to record deployment")?;

    let status = if new.success { "" } else { " (failed)" };
    writeln!(
        out,
        "Recorded {} of {}:{}{status} as #{id}",
        new.action, new.image, new.tag
    )?;
    Ok(Outcome::Done)
}

async fn resolve(
    db: &TimelineDb,
    image: &str,
    tag: &str,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    if let Some(resolved) = db.resolve_image(image, tag).await? {
        writeln!(out, "{resolved}")?;
        return Ok(Outcome::Done);
    }

    // Keep stdout clean for `$(ots image resolve current)`.
    writeln!(
        io::stderr(),
        "Alias {} is not set. Set it with: ots image set-current <tag>",
        tag.to_uppercase()
    )?;
    Ok(Outcome::NothingToDo)
}
