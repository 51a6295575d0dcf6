//! Group evaluation: which rule groups an instance fully violates.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::classifier::PrivateBlocks;
use crate::criteria::CriteriaGroup;
use crate::matcher::{match_criteria, NetworkAttachment};

/// A rule group fully matched by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupViolation {
    pub group_name: String,
    pub matched: BTreeSet<NetworkAttachment>,
}

/// Run every group against an instance's attachments.
///
/// Groups are evaluated independently and in the order given; the compiled
/// rule set keeps them sorted by name.
pub fn evaluate(
    attachments: &[NetworkAttachment],
    groups: &[CriteriaGroup],
    private_blocks: &PrivateBlocks,
) -> Vec<GroupViolation> {
    groups
        .iter()
        .filter_map(|group| {
            let result = match_criteria(attachments, &group.criteria, private_blocks);
            result
                .is_full_match(group.criteria.len())
                .then(|| GroupViolation {
                    group_name: group.name.clone(),
                    matched: result.matched,
                })
        })
        .collect()
}
