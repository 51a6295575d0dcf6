//! Alert records, the per-run report, and report delivery (email or log).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info};

use crate::compute::Instance;
use crate::config::{Account, EmailAlerts};
use crate::criteria::CriteriaGroup;
use crate::evaluator::GroupViolation;
use crate::matcher::NetworkAttachment;
use crate::removal::RemovalOutcome;

/// Timeout for the SMTP session
const SMTP_TIMEOUT_SECS: u64 = 30;

/// Heading of every alert block in the rendered report
pub const ALERT_HEADING: &str = "Offending network match detected";

/// One rule group fully matched by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub account_name: String,
    pub account_description: String,
    pub account_url: String,
    pub group_name: String,
    /// The group's criteria as configured
    pub group_criteria: Vec<String>,
    pub instance_id: String,
    pub instance_name: String,
    pub instance_ips: Vec<String>,
    pub instance_networks: Vec<String>,
    pub firewall_enabled: bool,
    pub matched: Vec<NetworkAttachment>,
    /// Set when the account has removal criteria
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal: Option<RemovalOutcome>,
}

impl Alert {
    pub fn new(
        account: &Account,
        group: &CriteriaGroup,
        instance: &Instance,
        violation: GroupViolation,
    ) -> Self {
        Self {
            account_name: account.account_name.clone(),
            account_description: account.description.clone(),
            account_url: account.url.clone(),
            group_name: violation.group_name,
            group_criteria: group.tokens(),
            instance_id: instance.id.clone(),
            instance_name: instance.name.clone(),
            instance_ips: instance.ips.clone(),
            instance_networks: instance.networks.clone(),
            firewall_enabled: instance.firewall_enabled,
            matched: violation.matched.into_iter().collect(),
            removal: None,
        }
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "{}", ALERT_HEADING);
        let _ = writeln!(out, "Account Name: {}", self.account_name);
        let _ = writeln!(out, "Account Description: {}", self.account_description);
        let _ = writeln!(out, "Account URL: {}", self.account_url);
        let _ = writeln!(out, "Match Group: {}", self.group_name);
        let _ = writeln!(out, "Networks Matched: {}", self.group_criteria.join(", "));
        let _ = writeln!(out, "Instance ID: {}", self.instance_id);
        let _ = writeln!(out, "Instance Name: {}", self.instance_name);
        let _ = writeln!(out, "Instance IPs: {}", self.instance_ips.join(", "));
        let _ = writeln!(out, "Instance Firewall Enabled: {}", self.firewall_enabled);
        let _ = writeln!(out, "Instance Networks: {}", self.instance_networks.join(", "));

        if let Some(removal) = &self.removal {
            let networks = |steps: &[crate::removal::RemovalStep]| {
                steps
                    .iter()
                    .map(|s| format!("{} ({})", s.network_id, s.mac))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            if removal.dry_run {
                let _ = writeln!(
                    out,
                    "Instance Networks To Remove (dry run): {} NIC(s)",
                    removal.planned
                );
            } else {
                if !removal.removed.is_empty() {
                    let _ = writeln!(
                        out,
                        "Instance Networks Removed: {}",
                        networks(&removal.removed)
                    );
                }
                if let Some((step, reason)) = &removal.failed {
                    let _ = writeln!(
                        out,
                        "Instance Network Removal Failed: {} ({}): {}",
                        step.network_id, step.mac, reason
                    );
                }
            }
        }
        out.push('\n');
    }
}

/// Log an alert the moment it is recorded.
pub fn log_alert(alert: &Alert) {
    info!(
        "{}: {} ({}) {}",
        alert.group_name,
        alert.instance_name,
        alert.instance_id,
        alert.instance_ips.join(", ")
    );
}

/// Everything found in one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account_name: String,
    pub instances_audited: usize,
    pub alerts: Vec<Alert>,
    /// Recoverable errors (API failures, malformed instances)
    pub errors: Vec<String>,
    /// True when the account was cut short by shutdown
    pub aborted: bool,
}

impl AccountReport {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            ..Default::default()
        }
    }
}

/// Report for a whole audit run.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub hostname: String,
    pub accounts: Vec<AccountReport>,
}

impl AuditReport {
    pub fn new(accounts: Vec<AccountReport>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            generated_at: Utc::now(),
            hostname,
            accounts,
        }
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.accounts.iter().flat_map(|a| a.alerts.iter())
    }

    pub fn alert_count(&self) -> usize {
        self.accounts.iter().map(|a| a.alerts.len()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.accounts.iter().map(|a| a.errors.len()).sum()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "NIC audit run on {} at {}",
            self.hostname,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "{} alert(s) across {} account(s)\n",
            self.alert_count(),
            self.accounts.len()
        );

        for alert in self.alerts() {
            alert.render(&mut out);
        }

        if self.error_count() > 0 {
            let _ = writeln!(out, "Errors:");
            for account in &self.accounts {
                for error in &account.errors {
                    let _ = writeln!(out, "  [{}] {}", account.account_name, error);
                }
            }
        }
        out
    }

    pub fn render_html(&self) -> String {
        format!(
            "<html><body><pre>{}</pre></body></html>",
            escape_html(&self.render_text())
        )
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Destination for the run report.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &AuditReport) -> Result<()>;
}

/// Pick the sink for the configured email settings.
pub fn sink_for(config: &EmailAlerts) -> Box<dyn AlertSink> {
    if config.is_enabled() {
        Box::new(EmailSink::new(config.clone()))
    } else {
        Box::new(LogSink)
    }
}

/// Used when no SMTP server is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, report: &AuditReport) -> Result<()> {
        info!(
            "Email alerts disabled; {} alert(s) recorded in the log only",
            report.alert_count()
        );
        Ok(())
    }
}

/// Sends the report as one multipart email.
pub struct EmailSink {
    config: EmailAlerts,
}

impl EmailSink {
    pub fn new(config: EmailAlerts) -> Self {
        Self { config }
    }

    fn build_message(&self, report: &AuditReport) -> Result<Message> {
        let from = Mailbox::new(
            Some(self.config.from_name.clone()).filter(|n| !n.is_empty()),
            self.config
                .from
                .parse()
                .context("Invalid 'from' email address")?,
        );

        let mut builder = Message::builder().from(from).subject(&self.config.subject);
        for to in &self.config.to {
            builder = builder.to(to
                .parse()
                .with_context(|| format!("Invalid 'to' email address: {}", to))?);
        }
        for cc in &self.config.cc {
            builder = builder.cc(cc
                .parse()
                .with_context(|| format!("Invalid 'cc' email address: {}", cc))?);
        }
        for bcc in &self.config.bcc {
            builder = builder.bcc(bcc
                .parse()
                .with_context(|| format!("Invalid 'bcc' email address: {}", bcc))?);
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                report.render_text(),
                report.render_html(),
            ))
            .context("Failed to build email")
    }
}

#[async_trait]
impl AlertSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    /// SMTP runs in a blocking task to keep the executor free.
    async fn deliver(&self, report: &AuditReport) -> Result<()> {
        let email = self.build_message(report)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let timeout = Some(Duration::from_secs(SMTP_TIMEOUT_SECS));
            let mailer = if config.smtp_user.is_empty() {
                SmtpTransport::builder_dangerous(&config.smtp_server)
                    .port(config.smtp_port)
                    .timeout(timeout)
                    .build()
            } else {
                // SecureString is zeroed on drop
                let password = config.get_password();
                let creds =
                    Credentials::new(config.smtp_user.clone(), password.as_str().to_string());
                SmtpTransport::relay(&config.smtp_server)
                    .context("Failed to create SMTP transport")?
                    .port(config.smtp_port)
                    .timeout(timeout)
                    .credentials(creds)
                    .build()
            };

            mailer.send(&email).context("Failed to send email")?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("Email task panicked")??;

        debug!("Alert email sent to {} recipient(s)", self.config.to.len());
        Ok(())
    }
}
