//! CLI command definitions

use clap::Args;

/// Print every pipeline with its latest execution
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Start a new execution of a pipeline
#[derive(Debug, Args, Clone)]
pub struct TriggerCommand {
    /// Pipeline name
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
