//! Removal planning and execution for NICs on violating instances.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::classifier::PrivateBlocks;
use crate::compute::{normalize_mac, CallGuard, ComputeApi, Nic};
use crate::criteria::Criterion;
use crate::error::AuditError;
use crate::validation::validate_ip;

/// One NIC to detach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalStep {
    pub mac: String,
    pub network_id: String,
    /// The criterion that selected this NIC, as configured
    pub criterion: String,
}

/// Ordered NIC detach plan. A MAC appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalPlan {
    steps: Vec<RemovalStep>,
}

impl RemovalPlan {
    pub fn steps(&self) -> &[RemovalStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Select the NICs matched by any removal criterion.
///
/// Each NIC is tested against the criteria in order and recorded under the
/// first one that matches. Unlike group matching there is no network
/// consumption, only OR semantics.
pub fn plan_removals(
    nics: &[Nic],
    criteria: &[Criterion],
    private_blocks: &PrivateBlocks,
) -> RemovalPlan {
    let mut seen = HashSet::new();
    let mut steps = Vec::new();

    for nic in nics {
        let address = validate_ip(&nic.address).ok();
        let Some(criterion) = criteria
            .iter()
            .find(|c| c.matches(&nic.network_id, address, private_blocks))
        else {
            continue;
        };

        if !seen.insert(normalize_mac(&nic.mac)) {
            continue;
        }

        steps.push(RemovalStep {
            mac: nic.mac.clone(),
            network_id: nic.network_id.clone(),
            criterion: criterion.to_string(),
        });
    }

    RemovalPlan { steps }
}

/// Result of executing a plan against one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalOutcome {
    pub planned: usize,
    pub removed: Vec<RemovalStep>,
    /// The step that failed; later steps were not attempted
    pub failed: Option<(RemovalStep, String)>,
    pub dry_run: bool,
}

impl RemovalOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && (self.dry_run || self.removed.len() == self.planned)
    }
}

/// Detach NICs in plan order, stopping at the first failure.
///
/// Cancellation is returned as an error so the caller can stop the account;
/// any other failure is recorded in the outcome.
pub async fn execute_plan(
    api: &dyn ComputeApi,
    guard: &CallGuard,
    instance_id: &str,
    plan: &RemovalPlan,
    dry_run: bool,
) -> Result<RemovalOutcome, AuditError> {
    let mut outcome = RemovalOutcome {
        planned: plan.len(),
        dry_run,
        ..Default::default()
    };

    if dry_run {
        for step in plan.steps() {
            info!(
                "[dry-run] Would remove NIC {} on network {} ({}) from instance {}",
                step.mac, step.network_id, step.criterion, instance_id
            );
        }
        return Ok(outcome);
    }

    for step in plan.steps() {
        info!(
            "Removing NIC {} on network {} ({}) from instance {}",
            step.mac, step.network_id, step.criterion, instance_id
        );
        match guard
            .call("RemoveNic", api.remove_nic(instance_id, &step.mac))
            .await
        {
            Ok(()) => outcome.removed.push(step.clone()),
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                warn!(
                    "Failed to remove NIC {} from instance {}: {}",
                    step.mac, instance_id, e
                );
                outcome.failed = Some((step.clone(), e.to_string()));
                break;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::MockComputeApi;
    use crate::signal::ShutdownToken;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::time::Duration;

    const N1: &str = "70294144-7680-43d2-9ed0-897ce1658f80";
    const N2: &str = "14323a83-b0e3-44e8-bd67-fc7078cc94ba";

    fn nic(mac: &str, network: &str, ip: &str) -> Nic {
        Nic {
            mac: mac.to_string(),
            network_id: network.to_string(),
            address: ip.to_string(),
            primary: false,
        }
    }

    fn criteria(tokens: &[&str]) -> Vec<Criterion> {
        tokens
            .iter()
            .map(|t| Criterion::parse(t, "test").unwrap())
            .collect()
    }

    fn guard() -> CallGuard {
        CallGuard::new(Duration::from_secs(5), ShutdownToken::new())
    }

    fn sample_nics() -> Vec<Nic> {
        vec![
            nic("aa:00:00:00:00:01", N1, "10.0.0.5"),
            nic("aa:00:00:00:00:02", N2, "165.122.33.44"),
            nic("aa:00:00:00:00:03", N2, "165.122.33.45"),
        ]
    }

    #[test]
    fn test_plan_public() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let macs: Vec<_> = plan.steps().iter().map(|s| s.mac.as_str()).collect();
        // No network consumption: both NICs on N2 are selected
        assert_eq!(macs, vec!["aa:00:00:00:00:02", "aa:00:00:00:00:03"]);
        assert_eq!(plan.steps()[0].criterion, "public");
    }

    #[test]
    fn test_plan_exact_network() {
        let plan = plan_removals(&sample_nics(), &criteria(&[N1]), &PrivateBlocks::rfc1918());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].network_id, N1);
    }

    #[test]
    fn test_plan_dedups_nic_matched_by_several_criteria() {
        let plan = plan_removals(
            &sample_nics(),
            &criteria(&["public", "165.122.32.0/21", N2]),
            &PrivateBlocks::rfc1918(),
        );
        assert_eq!(plan.len(), 2);
        assert!(plan.steps().iter().all(|s| s.criterion == "public"));
    }

    #[test]
    fn test_plan_dedups_repeated_mac() {
        let nics = vec![
            nic("AA:00:00:00:00:02", N2, "165.122.33.44"),
            nic("aa:00:00:00:00:02", N2, "165.122.33.44"),
        ];
        let plan = plan_removals(&nics, &criteria(&["public"]), &PrivateBlocks::rfc1918());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_plan_dedups_mac_across_separator_styles() {
        let nics = vec![
            nic("aa:00:00:00:00:02", N2, "165.122.33.44"),
            nic("aa0000000002", N2, "165.122.33.44"),
            nic("AA-00-00-00-00-02", N2, "165.122.33.44"),
        ];
        let plan = plan_removals(&nics, &criteria(&["public"]), &PrivateBlocks::rfc1918());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].mac, "aa:00:00:00:00:02");
    }

    #[test]
    fn test_plan_unparseable_address_matches_only_by_network() {
        let nics = vec![nic("aa:00:00:00:00:09", N1, "")];
        let blocks = PrivateBlocks::rfc1918();
        assert!(plan_removals(&nics, &criteria(&["public"]), &blocks).is_empty());
        assert_eq!(plan_removals(&nics, &criteria(&[N1]), &blocks).len(), 1);
    }

    #[test]
    fn test_plan_no_criteria() {
        assert!(plan_removals(&sample_nics(), &[], &PrivateBlocks::rfc1918()).is_empty());
    }

    #[tokio::test]
    async fn test_execute_in_order() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let mut api = MockComputeApi::new();
        let mut seq = Sequence::new();
        api.expect_remove_nic()
            .with(eq("inst-1"), eq("aa:00:00:00:00:02"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_remove_nic()
            .with(eq("inst-1"), eq("aa:00:00:00:00:03"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let outcome = execute_plan(&api, &guard(), "inst-1", &plan, false)
            .await
            .unwrap();
        assert_eq!(outcome.removed.len(), 2);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_execute_stops_at_first_failure() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let mut api = MockComputeApi::new();
        api.expect_remove_nic()
            .with(eq("inst-1"), eq("aa:00:00:00:00:02"))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("HTTP 409")));

        let outcome = execute_plan(&api, &guard(), "inst-1", &plan, false)
            .await
            .unwrap();
        assert!(outcome.removed.is_empty());
        let (step, reason) = outcome.failed.clone().unwrap();
        assert_eq!(step.mac, "aa:00:00:00:00:02");
        assert!(reason.contains("HTTP 409"));
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_execute_partial_success() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let mut api = MockComputeApi::new();
        api.expect_remove_nic()
            .with(eq("inst-1"), eq("aa:00:00:00:00:02"))
            .returning(|_, _| Ok(()));
        api.expect_remove_nic()
            .with(eq("inst-1"), eq("aa:00:00:00:00:03"))
            .returning(|_, _| Err(anyhow::anyhow!("gone")));

        let outcome = execute_plan(&api, &guard(), "inst-1", &plan, false)
            .await
            .unwrap();
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.failed.unwrap().0.mac, "aa:00:00:00:00:03");
    }

    #[tokio::test]
    async fn test_execute_dry_run_makes_no_calls() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let mut api = MockComputeApi::new();
        api.expect_remove_nic().never();

        let outcome = execute_plan(&api, &guard(), "inst-1", &plan, true)
            .await
            .unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.planned, 2);
        assert!(outcome.removed.is_empty());
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        let plan = plan_removals(&sample_nics(), &criteria(&["public"]), &PrivateBlocks::rfc1918());
        let api = MockComputeApi::new();
        let guard = guard();
        guard.token().cancel();

        let err = execute_plan(&api, &guard, "inst-1", &plan, false)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
