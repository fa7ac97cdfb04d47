use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use tally_storage::InventoryStore;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod count;
mod csv_io;
mod labels;

use catalog::CatalogCommand;
use config::TallyConfig;
use count::CountCommand;
use labels::LabelCommand;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Warehouse inventory counting and reconciliation", long_about = None)]
struct Cli {
    /// Config file (defaults to $TALLY_CONFIG_PATH or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Locations, SKUs and duplicate candidates
    Catalog {
        #[command(subcommand)]
        action: CatalogCommand,
    },
    /// Barcode label records
    Labels {
        #[command(subcommand)]
        action: LabelCommand,
    },
    /// Physical counts, tasks, scans and variances
    Count {
        #[command(subcommand)]
        action: CountCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = config::config_path(cli.config.as_deref());
    let config = config::load_config(&config_path)?;
    init_logging(cli.debug, &config);

    let mut store = open_store(&config, &cli)?;
    match cli.command {
        Commands::Catalog { action } => catalog::handle_catalog_command(&mut store, action),
        Commands::Labels { action } => labels::handle_label_command(&mut store, action),
        Commands::Count { action } => {
            count::handle_count_command(&mut store, &config.roster(), action)
        }
    }
}

fn open_store(config: &TallyConfig, cli: &Cli) -> Result<InventoryStore> {
    let database = config.database_path(cli.database.as_deref());
    if let Some(parent) = database.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    debug!(database = %database.display(), "opening inventory store");
    InventoryStore::open_with(&database, config.store_options())
        .with_context(|| format!("Failed to open database {}", database.display()))
}

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_logging(debug: bool, config: &TallyConfig) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = env::var("TALLY_LOG_LEVEL") {
        level
    } else {
        config
            .log_level
            .clone()
            .unwrap_or_else(|| "info".to_string())
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommands() {
        let cli = Cli::try_parse_from([
            "tally",
            "count",
            "list",
            "--project",
            "proj-1",
            "--database",
            "inv.db",
            "--debug",
        ])
        .expect("parse");
        assert!(cli.debug);
        assert_eq!(cli.database, Some(PathBuf::from("inv.db")));
        assert!(matches!(cli.command, Commands::Count { .. }));
    }

    #[test]
    fn tolerance_needs_exactly_one_mode() {
        assert!(Cli::try_parse_from(["tally", "count", "tolerance", "c-1"]).is_err());
        assert!(Cli::try_parse_from([
            "tally", "count", "tolerance", "c-1", "--set", "2", "--clear"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["tally", "count", "tolerance", "c-1", "--clear"]).is_ok());
    }

    #[test]
    fn label_type_accepts_short_alias() {
        let cli = Cli::try_parse_from([
            "tally", "labels", "print", "--project", "p", "--type", "loc", "l-1", "l-2",
        ])
        .expect("parse");
        let Commands::Labels {
            action: LabelCommand::Print(args),
        } = cli.command
        else {
            panic!("expected labels print");
        };
        assert_eq!(args.label_type, tally_core::LabelType::Location);
        assert_eq!(args.ids, vec!["l-1", "l-2"]);
    }
}
