use crate::print_json;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tally_core::LabelType;
use tally_storage::InventoryStore;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum LabelCommand {
    /// Record printed labels and emit what to render
    Print(PrintArgs),
    /// Mark labels as physically installed
    Install(InstallArgs),
}

#[derive(Args, Debug)]
pub struct PrintArgs {
    #[arg(long)]
    pub project: String,
    /// sku or location
    #[arg(long = "type")]
    pub label_type: LabelType,
    pub ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub user: String,
    pub ids: Vec<String>,
}

pub fn handle_label_command(store: &mut InventoryStore, command: LabelCommand) -> Result<()> {
    match command {
        LabelCommand::Print(args) => {
            let items = store
                .print_labels(&args.project, args.label_type, &args.ids)
                .context("Failed to print labels")?;
            print_json(&items)
        }
        LabelCommand::Install(args) => {
            let installed = store
                .mark_labels_installed(&args.project, &args.ids, &args.user)
                .context("Failed to mark labels installed")?;
            print_json(&installed)
        }
    }
}
