use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use ots_cli::cli::{Cli, Commands};
use ots_cli::{image_cmd, service_cmd};
use ots_core::config::load_config;
use ots_core::tracing_init::init_tracing;
use ots_timeline::TimelineDb;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    init_tracing(config.log_level(), config.log_json());
    debug!(?config, "Configuration resolved");

    let db_path = config
        .database_path()
        .context("No data directory found; pass --db-path or set OTS_DB_PATH")?;
    info!(path = %db_path.display(), "Opening timeline database");
    let db = TimelineDb::open(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let mut stdout = io::stdout().lock();
    let result = match cli.command {
        Commands::Image(command) => {
            image_cmd::run(command, &db, config.default_image(), &mut stdout).await
        }
        Commands::Service(command) => service_cmd::run(command, &db, &mut stdout).await,
    };
    db.close().await;

    Ok(result?.into())
}
