//! Audit passes: one account at a time, or every configured account.
//!
//! ```text
//! list instances ──▶ attachments ──▶ evaluate groups ──▶ alerts
//!                                         │
//!                                         ▼ (account has removal criteria)
//!                              list NICs ──▶ plan ──▶ detach
//! ```
//!
//! API failures and malformed instances are recorded in the account report
//! and the pass moves on. Cancellation stops the current account and skips
//! the ones not yet started.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::{log_alert, Alert, AccountReport, AuditReport};
use crate::compute::{CallGuard, ComputeApi, Instance};
use crate::config::{Account, AccountRules, RuleSet};
use crate::error::AuditError;
use crate::evaluator::evaluate;
use crate::removal::{execute_plan, plan_removals, RemovalOutcome};
use crate::signal::ShutdownToken;

/// Knobs for one audit run.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Plan removals but never detach
    pub dry_run: bool,
    pub max_parallel_accounts: usize,
    pub api_timeout: Duration,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_parallel_accounts: 1,
            api_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs audit passes against a compiled rule set.
pub struct Auditor<'a> {
    rules: &'a RuleSet,
    guard: CallGuard,
    options: AuditOptions,
}

impl<'a> Auditor<'a> {
    pub fn new(rules: &'a RuleSet, options: AuditOptions, token: ShutdownToken) -> Self {
        Self {
            rules,
            guard: CallGuard::new(options.api_timeout, token),
            options,
        }
    }

    /// Audit every account, `max_parallel_accounts` at a time.
    ///
    /// `connect` builds the API client for an account; a failure there is
    /// recorded against that account only. Reports keep configuration order.
    pub async fn run<F>(&self, connect: F) -> AuditReport
    where
        F: Fn(&Account) -> Result<Box<dyn ComputeApi>>,
    {
        let connect = &connect;
        let accounts = stream::iter(self.rules.accounts.iter())
            .map(|rules| async move {
                if self.guard.token().is_cancelled() {
                    return skipped(rules);
                }
                match connect(&rules.account) {
                    Ok(api) => self.audit_account(rules, api.as_ref()).await,
                    Err(e) => {
                        warn!(
                            "Unable to audit account [{}]: {:#}",
                            rules.account.account_name, e
                        );
                        let mut report = AccountReport::new(&rules.account.account_name);
                        report.errors.push(format!("{:#}", e));
                        report
                    }
                }
            })
            .buffered(self.options.max_parallel_accounts.max(1))
            .collect::<Vec<_>>()
            .await;

        AuditReport::new(accounts)
    }

    /// Audit one account with an already connected client.
    pub async fn audit_account(&self, rules: &AccountRules, api: &dyn ComputeApi) -> AccountReport {
        let name = &rules.account.account_name;
        let mut report = AccountReport::new(name);
        info!("Auditing account [{}]", name);

        let instances = match self
            .guard
            .call("ListMachines", api.list_instances())
            .await
        {
            Ok(instances) => instances,
            Err(e) => {
                record_error(&mut report, name, None, e);
                return report;
            }
        };
        debug!("Account [{}] has {} instances", name, instances.len());

        for instance in &instances {
            if self.guard.token().is_cancelled() {
                info!("Account [{}] aborted by shutdown", name);
                report.aborted = true;
                break;
            }
            report.instances_audited += 1;

            if let Err(e) = self.audit_instance(rules, api, instance, &mut report).await {
                let cancelled = e.is_cancellation();
                record_error(&mut report, name, Some(&instance.id), e);
                if cancelled {
                    break;
                }
            }
        }

        info!(
            "Account [{}]: {} instances audited, {} alert(s)",
            name,
            report.instances_audited,
            report.alerts.len()
        );
        report
    }

    async fn audit_instance(
        &self,
        rules: &AccountRules,
        api: &dyn ComputeApi,
        instance: &Instance,
        report: &mut AccountReport,
    ) -> Result<(), AuditError> {
        let attachments = instance.attachments()?;
        let violations = evaluate(&attachments, &self.rules.groups, &self.rules.private_blocks);
        if violations.is_empty() {
            return Ok(());
        }

        let mut alerts: Vec<Alert> = violations
            .into_iter()
            .filter_map(|violation| {
                self.rules
                    .groups
                    .iter()
                    .find(|g| g.name == violation.group_name)
                    .map(|group| Alert::new(&rules.account, group, instance, violation))
            })
            .collect();

        // Alerts are recorded even when removal fails part way
        let result = match self.remove_nics(rules, api, instance).await {
            Ok(Some(outcome)) => {
                if let Some((step, reason)) = &outcome.failed {
                    report.errors.push(format!(
                        "Instance {}: failed to remove NIC {}: {}",
                        instance.id, step.mac, reason
                    ));
                }
                for alert in &mut alerts {
                    alert.removal = Some(outcome.clone());
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        for alert in alerts {
            log_alert(&alert);
            report.alerts.push(alert);
        }
        result
    }

    /// Plan and run NIC removal for a violating instance. `None` when the
    /// account has no removal criteria.
    async fn remove_nics(
        &self,
        rules: &AccountRules,
        api: &dyn ComputeApi,
        instance: &Instance,
    ) -> Result<Option<RemovalOutcome>, AuditError> {
        if rules.removal_criteria.is_empty() {
            return Ok(None);
        }

        let nics = self
            .guard
            .call("ListNics", api.list_nics(&instance.id))
            .await?;
        let plan = plan_removals(&nics, &rules.removal_criteria, &self.rules.private_blocks);
        if plan.is_empty() {
            debug!("No NICs on instance {} match removal criteria", instance.id);
        }

        execute_plan(api, &self.guard, &instance.id, &plan, self.options.dry_run)
            .await
            .map(Some)
    }
}

fn skipped(rules: &AccountRules) -> AccountReport {
    info!(
        "Skipping account [{}]: shutdown requested",
        rules.account.account_name
    );
    let mut report = AccountReport::new(&rules.account.account_name);
    report.aborted = true;
    report
}

fn record_error(
    report: &mut AccountReport,
    account: &str,
    instance_id: Option<&str>,
    error: AuditError,
) {
    if error.is_cancellation() {
        report.aborted = true;
    }
    let message = match (instance_id, &error) {
        // These already name the instance
        (_, AuditError::MisalignedAttachments { .. } | AuditError::InvalidAddress { .. }) => {
            error.to_string()
        }
        (Some(id), _) => format!("Instance {}: {}", id, error),
        (None, _) => error.to_string(),
    };
    warn!("Account [{}]: {}", account, message);
    report.errors.push(message);
}
