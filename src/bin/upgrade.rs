use clap::Parser;
use diesel::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ella_rs::config::EllaSiteConfig;
use ella_rs::upgrade;
use ella_rs::{CONFIG_VAR, DEFAULT_CONFIG_PATH};

/// Folds the configured legacy content table into core_publishable.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = CONFIG_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Attempt to undo the upgrade. Always fails.
    #[arg(long)]
    backwards: bool,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.backwards {
        upgrade::backwards()?;
    }

    let config = EllaSiteConfig::from_file(&args.config)?;
    let mut conn = SqliteConnection::establish(&config.database_url)?;
    ella_rs::run_schema_migrations(&mut conn)?;

    let report = upgrade::forwards(&mut conn, &config.upgrade)?;
    info!(
        steps = report.steps.len(),
        rows = report.copied_rows,
        authors = report.moved_authors,
        "done"
    );
    for (table, column) in &report.unresolved_referrers {
        warn!(table = %table, column = %column, "still holds legacy ids");
    }
    for (table, rows) in &report.remapped {
        info!(table = %table, rows = *rows, "remapped generic references");
    }
    Ok(())
}
