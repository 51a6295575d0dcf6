//! nic-audit - network combination audit for compute instances
//!
//! Finds instances attached to forbidden combinations of networks, reports
//! them, and optionally detaches the offending NICs.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use nic_audit::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command_or_default() {
        Commands::Audit { dry_run, format } => {
            nic_audit::commands::audit::run(dry_run, format, &cli.config).await
        }
        Commands::Validate => nic_audit::commands::validate::run(&cli.config),
        Commands::Version => {
            println!("nic-audit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
