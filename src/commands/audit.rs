//! Audit command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::alerts::sink_for;
use crate::audit::{AuditOptions, Auditor};
use crate::compute::{CloudApiClient, ComputeApi};
use crate::config::Config;
use crate::signal::{ShutdownGuard, ShutdownToken};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Run the audit command
pub async fn run(dry_run: bool, format: OutputFormat, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let rules = config.compile()?;

    if rules.accounts.is_empty() {
        info!("No accounts configured, nothing to audit");
        return Ok(());
    }
    if dry_run {
        info!("[dry-run] NIC removal disabled for this run");
    }

    let token = ShutdownToken::new();
    let _shutdown = ShutdownGuard::new(token.clone());
    let options = AuditOptions {
        dry_run,
        max_parallel_accounts: config.max_parallel_accounts,
        api_timeout: Duration::from_secs(config.api_timeout_secs),
    };
    let timeout = options.api_timeout;
    let auditor = Auditor::new(&rules, options, token);

    let report = auditor
        .run(|account| {
            CloudApiClient::new(account, timeout).map(|c| Box::new(c) as Box<dyn ComputeApi>)
        })
        .await;

    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    info!(
        "Audit complete: {} alert(s), {} error(s) across {} account(s)",
        report.alert_count(),
        report.error_count(),
        report.accounts.len()
    );

    if report.alert_count() > 0 {
        let sink = sink_for(&config.email_alerts);
        if let Err(e) = sink.deliver(&report).await {
            // Alerts are already in the log and on stdout
            error!("Failed to deliver report via {}: {:#}", sink.name(), e);
        }
    }

    Ok(())
}
