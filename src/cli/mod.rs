//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{StatusCommand, TriggerCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Browse and trigger AWS CodePipeline pipelines from the terminal
#[derive(Debug, Parser, Clone)]
#[command(name = "aws-codepipeline-cli")]
#[command(version)]
#[command(about = "Interactive terminal utility for AWS CodePipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// AWS region (overrides the config file and environment)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS named profile (overrides the config file and environment)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log file for the interactive session
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Non-interactive commands; without one the interactive session starts
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print every pipeline with its latest execution
    Status(StatusCommand),

    /// Start a new execution of a pipeline
    Trigger(TriggerCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Whether this invocation starts the interactive session
    pub fn is_interactive(&self) -> bool {
        self.command.is_none()
    }
}
