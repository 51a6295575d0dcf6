//! Validate command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Load and compile the configuration, then print what it contains.
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let rules = config.compile()?;

    println!("Configuration OK: {:?}", config_path);
    println!(
        "  Private blocks: {}",
        rules
            .private_blocks
            .blocks()
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Rule groups: {}", rules.groups.len());
    for group in &rules.groups {
        println!("    {}: {}", group.name, group.tokens().join(", "));
    }
    println!("  Accounts: {}", rules.accounts.len());
    for account in &rules.accounts {
        println!(
            "    {} ({}) - {} removal criteria",
            account.account.account_name,
            account.account.url,
            account.removal_criteria.len()
        );
    }
    println!(
        "  Email alerts: {}",
        if config.email_alerts.is_enabled() {
            format!(
                "{}:{}",
                config.email_alerts.smtp_server, config.email_alerts.smtp_port
            )
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}
