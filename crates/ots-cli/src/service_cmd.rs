//! Service subcommands: list, register, remove, record, history.

use std::io::Write;

use anyhow::Context;

use ots_timeline::{ServiceInstanceParams, TimelineDb};

use crate::Outcome;

/// Service subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum ServiceCommand {
    /// List registered service instances.
    List {
        /// Only show instances of this package (e.g. valkey)
        package: Option<String>,
    },
    /// Register a service instance, or update an existing one.
    Register {
        /// Package name (e.g. valkey, redis)
        package: String,
        /// Instance name, usually the port (e.g. 6379)
        instance: String,
        /// Instance config file
        #[arg(long)]
        config_file: String,
        /// Instance data directory
        #[arg(long)]
        data_dir: String,
        /// Port the instance listens on
        #[arg(short, long)]
        port: Option<u16>,
        /// Free-text context
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a service instance from the registry. Its history is kept.
    Remove {
        package: String,
        instance: String,
    },
    /// Record a service action (init, enable, start, stop, ...).
    Record {
        package: String,
        instance: String,
        action: String,
        /// Mark the action as failed
        #[arg(long)]
        failed: bool,
        /// Free-text context
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show the service action audit trail.
    History {
        package: Option<String>,
        /// Requires a package
        instance: Option<String>,
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,
    },
}

/// Execute a service subcommand.
pub async fn run(
    command: ServiceCommand,
    db: &TimelineDb,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    match command {
        ServiceCommand::List { package } => list(db, package.as_deref(), out).await,
        ServiceCommand::Register {
            package,
            instance,
            config_file,
            data_dir,
            port,
            notes,
        } => {
            let params = ServiceInstanceParams {
                package: &package,
                instance: &instance,
                config_file: &config_file,
                data_dir: &data_dir,
                port,
                notes: notes.as_deref(),
            };
            let id = db
                .record_service_instance(&params)
                .await
                .context("Failed to register service instance")?;
            writeln!(out, "Registered {package}@{instance} (#{id})")?;
            Ok(Outcome::Done)
        }
        ServiceCommand::Remove { package, instance } => {
            if db.delete_service_instance(&package, &instance).await? {
                writeln!(out, "Removed {package}@{instance} from the registry")?;
                Ok(Outcome::Done)
            } else {
                writeln!(out, "No service instance {package}@{instance} registered")?;
                Ok(Outcome::NothingToDo)
            }
        }
        ServiceCommand::Record {
            package,
            instance,
            action,
            failed,
            notes,
        } => {
            let id = db
                .record_service_action(&package, &instance, &action, !failed, notes.as_deref())
                .await
                .context("Failed to record service action")?;
            writeln!(out, "Recorded {action} for {package}@{instance} as #{id}")?;
            Ok(Outcome::Done)
        }
        ServiceCommand::History {
            package,
            instance,
            limit,
        } => history(db, package.as_deref(), instance.as_deref(), limit, out).await,
    }
}

async fn list(db: &TimelineDb, package: Option<&str>, out: &mut impl Write) -> anyhow::Result<Outcome> {
    let instances = db
        .get_service_instances(package)
        .await
        .context("Failed to read service instances")?;

    if instances.is_empty() {
        writeln!(out, "No service instances registered.")?;
        return Ok(Outcome::Done);
    }

    writeln!(
        out,
        "{:<20} {:<10} {:>5}  {:<40} {}",
        "PACKAGE", "INSTANCE", "PORT", "CONFIG", "DATA DIR"
    )?;
    for s in &instances {
        let port = s.port.map_or_else(|| "-".to_string(), |p| p.to_string());
        writeln!(
            out,
            "{:<20} {:<10} {:>5}  {:<40} {}",
            s.package, s.instance, port, s.config_file, s.data_dir
        )?;
    }
    Ok(Outcome::Done)
}

async fn history(
    db: &TimelineDb,
    package: Option<&str>,
    instance: Option<&str>,
    limit: u32,
    out: &mut impl Write,
) -> anyhow::Result<Outcome> {
    if package.is_none() && instance.is_some() {
        anyhow::bail!("an instance filter needs a package");
    }

    let actions = db
        .get_service_actions(package, instance, limit)
        .await
        .context("Failed to read service actions")?;

    if actions.is_empty() {
        writeln!(out, "No service actions recorded yet.")?;
        return Ok(Outcome::Done);
    }

    writeln!(
        out,
        "{:>4}  {:<20}  {:<24}  {:<12}  {:<6}  Notes",
        "ID", "Timestamp", "Service", "Action", "Status"
    )?;
    for a in &actions {
        let status = if a.success { "OK" } else { "FAIL" };
        writeln!(
            out,
            "{:>4}  {:<20}  {:<24}  {:<12}  {:<6}  {}",
            a.id,
            a.timestamp,
            format!("{}@{}", a.package, a.instance),
            a.action,
            status,
            a.notes.as_deref().unwrap_or("")
        )?;
    }
    Ok(Outcome::Done)
}
