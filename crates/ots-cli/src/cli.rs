//! Top-level argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ots_core::Config;

use crate::image_cmd::ImageCommand;
use crate::service_cmd::ServiceCommand;

/// Deployment timeline and image aliases for ots containers.
#[derive(Debug, Parser)]
#[command(name = "ots", version, about)]
pub struct Cli {
    /// Config file (JSON), layered over the global settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Deployment timeline database file
    #[arg(long, global = true, env = "OTS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Image aliases, rollback and the deployment timeline
    #[command(subcommand)]
    Image(ImageCommand),
    /// Service instance registry and action audit trail
    #[command(subcommand)]
    Service(ServiceCommand),
}

impl Cli {
    /// Apply flag values on top of the file/env configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.db_path {
            config.database.path = Some(path.clone());
        }
        if self.log_json {
            config.log.json = Some(true);
        }
    }
}
