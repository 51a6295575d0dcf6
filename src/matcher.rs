//! Criteria matching engine.
//!
//! Counts how many of a group's criteria an instance's network attachments
//! satisfy. Criteria are applied in order against a shrinking pool of
//! attachments keyed by address:
//!
//! - an exact network match removes only the matched address
//! - a CIDR or `public` match removes every address on the matched network
//!
//! so one logical network cannot satisfy several address-based criteria.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::classifier::PrivateBlocks;
use crate::criteria::Criterion;
use crate::error::AuditError;

/// One NIC's network membership on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetworkAttachment {
    pub network_id: String,
    pub address: IpAddr,
}

impl NetworkAttachment {
    pub fn new(network_id: impl Into<String>, address: IpAddr) -> Self {
        Self {
            network_id: network_id.into(),
            address,
        }
    }
}

/// Build attachments from index-aligned network and IP lists.
pub fn attachments_from_parallel(
    instance_id: &str,
    networks: &[String],
    ips: &[String],
) -> Result<Vec<NetworkAttachment>, AuditError> {
    if networks.len() != ips.len() {
        return Err(AuditError::MisalignedAttachments {
            instance_id: instance_id.to_string(),
            networks: networks.to_vec(),
            ips: ips.to_vec(),
        });
    }

    networks
        .iter()
        .zip(ips)
        .map(|(network_id, ip)| {
            let address = ip
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| AuditError::InvalidAddress {
                    instance_id: instance_id.to_string(),
                    address: ip.clone(),
                })?;
            Ok(NetworkAttachment::new(network_id.clone(), address))
        })
        .collect()
}

/// Outcome of matching one criteria list against one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched_count: usize,
    pub matched: BTreeSet<NetworkAttachment>,
}

impl MatchResult {
    /// A group is violated only when the count equals the criteria length
    /// exactly. A criterion matching several attachments pushes the count
    /// past the length and the group is not reported.
    pub fn is_full_match(&self, criteria_len: usize) -> bool {
        self.matched_count == criteria_len
    }
}

/// Match an ordered criteria list against an instance's attachments.
///
/// Addresses are unique keys in the pool; a repeated address keeps its last
/// network. Within one criterion, pool entries are visited in ascending
/// address order. `matched` holds every attachment removed from the pool,
/// so a network-consuming match can record more attachments than it counts.
pub fn match_criteria(
    attachments: &[NetworkAttachment],
    criteria: &[Criterion],
    private_blocks: &PrivateBlocks,
) -> MatchResult {
    let mut pool: BTreeMap<IpAddr, String> = attachments
        .iter()
        .map(|a| (a.address, a.network_id.clone()))
        .collect();
    let mut result = MatchResult::default();

    for criterion in criteria {
        let candidates: Vec<IpAddr> = pool.keys().copied().collect();

        for address in candidates {
            // Consumed earlier in this pass by a network-wide removal
            let Some(network_id) = pool.get(&address).cloned() else {
                continue;
            };

            if !criterion.matches(&network_id, Some(address), private_blocks) {
                continue;
            }

            result.matched_count += 1;
            if criterion.consumes_network() {
                // Every address on the network leaves the pool and is recorded
                pool.retain(|addr, net| {
                    if *net != network_id {
                        return true;
                    }
                    result
                        .matched
                        .insert(NetworkAttachment::new(net.clone(), *addr));
                    false
                });
            } else {
                pool.remove(&address);
                result
                    .matched
                    .insert(NetworkAttachment::new(network_id, address));
            }
        }
    }

    result
}
