use crate::catalog::ProjectArgs;
use crate::csv_io::write_variance_report;
use crate::print_json;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tally_core::{CountPatch, MemberDirectory, NewCount, NewTask, RecountInput, ScanInput};
use tally_storage::InventoryStore;
use tracing::info;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum CountCommand {
    Create(CreateArgs),
    List(ProjectArgs),
    /// Count with tasks, scans, variances and rollups
    Show(CountArgs),
    Start(CountArgs),
    /// Set or clear the variance tolerance in percent
    Tolerance(ToleranceArgs),
    /// Reconcile and close; closing again recomputes variances
    Close(CountArgs),
    /// Add a counting task over one zone
    Task(TaskArgs),
    Scan(ScanArgs),
    Recount(RecountArgs),
    /// Set or clear the reason on a variance
    Reason(ReasonArgs),
    /// Write the variance report as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ToleranceArgs {
    pub id: String,
    #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
    pub set: Option<f64>,
    #[arg(long)]
    pub clear: bool,
}

impl ToleranceArgs {
    fn patch(&self) -> CountPatch {
        CountPatch {
            status: None,
            tolerance_pct: Some(if self.clear { None } else { self.set }),
        }
    }
}

#[derive(Args, Debug)]
pub struct TaskArgs {
    pub id: String,
    #[arg(long)]
    pub zone: String,
    #[arg(long)]
    pub assignee: Option<String>,
    /// Show expected quantities to the counter
    #[arg(long)]
    pub no_blind: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    pub id: String,
    #[arg(long)]
    pub task: String,
    #[arg(long)]
    pub location: String,
    #[arg(long)]
    pub sku: Option<String>,
    #[arg(long)]
    pub qty: f64,
    #[arg(long)]
    pub device: Option<String>,
}

#[derive(Args, Debug)]
pub struct RecountArgs {
    pub id: String,
    #[arg(long)]
    pub task: String,
    #[arg(long)]
    pub scan: String,
    #[arg(long)]
    pub qty: f64,
}

#[derive(Args, Debug)]
pub struct ReasonArgs {
    pub id: String,
    #[arg(long)]
    pub variance: String,
    /// Omit to clear the reason
    #[arg(long)]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    pub id: String,
    /// Defaults to stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn handle_count_command(
    store: &mut InventoryStore,
    members: &dyn MemberDirectory,
    command: CountCommand,
) -> Result<()> {
    match command {
        CountCommand::Create(args) => {
            let count = store
                .create_count(
                    &args.project,
                    NewCount {
                        tolerance_pct: args.tolerance,
                    },
                )
                .context("Failed to create count")?;
            print_json(&count)
        }
        CountCommand::List(args) => print_json(&store.list_counts(&args.project)?),
        CountCommand::Show(args) => print_json(&store.count_detail(&args.id)?),
        CountCommand::Start(args) => {
            let count = store
                .start_count(&args.id)
                .context("Failed to start count")?;
            print_json(&count)
        }
        CountCommand::Tolerance(args) => {
            let count = store
                .update_count(&args.id, args.patch())
                .context("Failed to update tolerance")?;
            print_json(&count)
        }
        CountCommand::Close(args) => {
            let detail = store
                .close_count(&args.id)
                .context("Failed to close count")?;
            print_json(&detail)
        }
        CountCommand::Task(args) => {
            let task = store
                .add_task(
                    &args.id,
                    NewTask {
                        zone_id: args.zone,
                        assigned_to_id: args.assignee,
                        blind: !args.no_blind,
                    },
                    members,
                )
                .context("Failed to add task")?;
            print_json(&task)
        }
        CountCommand::Scan(args) => {
            let scan = store
                .record_scan(
                    &args.id,
                    &args.task,
                    ScanInput {
                        location_id: args.location,
                        sku_id: args.sku,
                        qty: args.qty,
                        device_id: args.device,
                    },
                )
                .context("Failed to record scan")?;
            print_json(&scan)
        }
        CountCommand::Recount(args) => {
            let scan = store
                .record_recount(
                    &args.id,
                    &args.task,
                    &args.scan,
                    RecountInput { qty2: args.qty },
                )
                .context("Failed to record recount")?;
            print_json(&scan)
        }
        CountCommand::Reason(args) => {
            let variance = store
                .set_variance_reason(&args.id, &args.variance, args.text.as_deref())
                .context("Failed to set variance reason")?;
            print_json(&variance)
        }
        CountCommand::Export(args) => {
            let rows = store
                .variance_report(&args.id)
                .context("Failed to load variances")?;
            match args.output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_variance_report(file, &rows)?;
                    info!(path = %path.display(), rows = rows.len(), "exported variances");
                    Ok(())
                }
                None => write_variance_report(io::stdout().lock(), &rows),
            }
        }
    }
}
