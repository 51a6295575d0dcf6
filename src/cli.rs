//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::audit::OutputFormat;
use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "nic-audit")]
#[command(author, version, about = "Audit compute instances for forbidden network combinations")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Defaults to `audit`
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit every configured account and report violations
    Audit {
        /// Plan NIC removals but don't detach anything
        #[arg(long)]
        dry_run: bool,

        /// Report output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check the configuration and print a summary
    Validate,

    /// Show version
    Version,
}

impl Cli {
    /// The subcommand to run, `audit` when none was given.
    pub fn command_or_default(&self) -> Commands {
        match &self.command {
            Some(Commands::Audit { dry_run, format }) => Commands::Audit {
                dry_run: *dry_run,
                format: *format,
            },
            Some(Commands::Validate) => Commands::Validate,
            Some(Commands::Version) => Commands::Version,
            None => Commands::Audit {
                dry_run: false,
                format: OutputFormat::Text,
            },
        }
    }
}
