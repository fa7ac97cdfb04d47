use crate::csv_io::read_sku_rows;
use crate::print_json;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tally_core::provisioning::RangeDefinition;
use tally_core::LocationAssignment;
use tally_storage::InventoryStore;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum CatalogCommand {
    /// Create zones, racks and locations from a JSON list of ranges
    Provision(FileArgs),
    /// Upsert SKUs from a CSV sheet
    ImportSkus(FileArgs),
    Skus(ProjectArgs),
    Locations(ProjectArgs),
    Duplicates(ProjectArgs),
    /// Set the expected stock of a location
    Assign(AssignArgs),
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[arg(long)]
    pub project: String,
}

#[derive(Args, Debug)]
pub struct FileArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub location: String,
    #[arg(long)]
    pub sku: Option<String>,
    #[arg(long)]
    pub expected: Option<f64>,
}

pub fn handle_catalog_command(store: &mut InventoryStore, command: CatalogCommand) -> Result<()> {
    match command {
        CatalogCommand::Provision(args) => {
            let ranges = read_ranges(&args.file)?;
            let report = store
                .provision_locations(&args.project, &ranges)
                .context("Failed to provision locations")?;
            print_json(&report)
        }
        CatalogCommand::ImportSkus(args) => {
            let file = File::open(&args.file)
                .with_context(|| format!("Failed to open {}", args.file.display()))?;
            let rows = read_sku_rows(file)?;
            let report = store
                .import_skus(&args.project, &rows)
                .context("Failed to import SKUs")?;
            print_json(&report)
        }
        CatalogCommand::Skus(args) => print_json(&store.list_skus(&args.project)?),
        CatalogCommand::Locations(args) => print_json(&store.list_locations(&args.project)?),
        CatalogCommand::Duplicates(args) => {
            print_json(&store.duplicate_candidates(&args.project)?)
        }
        CatalogCommand::Assign(args) => {
            let view = store
                .assign_location(
                    &args.project,
                    &args.location,
                    LocationAssignment {
                        sku_id: args.sku,
                        expected_qty: args.expected,
                    },
                )
                .context("Failed to assign location")?;
            print_json(&view)
        }
    }
}

/// Accepts either a JSON array of ranges or a single range object.
fn read_ranges(path: &Path) -> Result<Vec<RangeDefinition>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_ranges(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_ranges(content: &str) -> Result<Vec<RangeDefinition>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let ranges = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(ranges)
}
