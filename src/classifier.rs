//! Public/private address classification against configured private blocks.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::error::AuditError;
use crate::validation::parse_cidr_list;

/// Default private blocks (RFC 1918).
pub const RFC1918_BLOCKS: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// The set of CIDR ranges treated as private address space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateBlocks {
    blocks: Vec<IpNet>,
}

impl PrivateBlocks {
    pub fn new(blocks: Vec<IpNet>) -> Self {
        Self { blocks }
    }

    /// Parse configured block strings. Each entry may be a single CIDR or a
    /// comma-delimited list of CIDRs.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, AuditError> {
        let mut blocks = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            let parsed = parse_cidr_list(entry).map_err(|e| AuditError::InvalidPrivateBlock {
                block: entry.to_string(),
                reason: match e {
                    AuditError::InvalidCidr { reason, .. } => reason,
                    other => other.to_string(),
                },
            })?;
            for net in parsed {
                if !blocks.contains(&net) {
                    blocks.push(net);
                }
            }
        }
        Ok(Self { blocks })
    }

    pub fn rfc1918() -> Self {
        Self::new(
            RFC1918_BLOCKS
                .iter()
                .filter_map(|b| b.parse().ok())
                .collect(),
        )
    }

    pub fn blocks(&self) -> &[IpNet] {
        &self.blocks
    }

    pub fn is_private(&self, ip: IpAddr) -> bool {
        self.blocks.iter().any(|block| block.contains(&ip))
    }

    /// An address is public when no private block contains it.
    pub fn is_public(&self, ip: IpAddr) -> bool {
        !self.is_private(ip)
    }
}

/// Free-function form of [`PrivateBlocks::is_public`].
pub fn is_public(ip: IpAddr, private_blocks: &PrivateBlocks) -> bool {
    private_blocks.is_public(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_blocks_everything_public() {
        let blocks = PrivateBlocks::default();
        assert!(is_public(ip("10.0.0.1"), &blocks));
        assert!(is_public(ip("192.168.1.1"), &blocks));
        assert!(is_public(ip("::1"), &blocks));
    }

    #[test]
    fn test_rfc1918_classification() {
        let blocks = PrivateBlocks::rfc1918();
        assert_eq!(blocks.blocks().len(), 3);
        assert!(!is_public(ip("192.168.0.7"), &blocks));
        assert!(!is_public(ip("10.2.45.234"), &blocks));
        assert!(!is_public(ip("172.20.1.1"), &blocks));
        assert!(is_public(ip("165.122.33.44"), &blocks));
        assert!(is_public(ip("172.32.0.1"), &blocks));
    }

    #[test]
    fn test_boundary_addresses_are_contained() {
        let blocks = PrivateBlocks::parse(&["192.168.24.0/21"]).unwrap();
        assert!(blocks.is_private(ip("192.168.24.0")));
        assert!(blocks.is_private(ip("192.168.31.255")));
        assert!(blocks.is_public(ip("192.168.32.0")));
        assert!(blocks.is_public(ip("192.168.23.255")));
    }

    #[test]
    fn test_address_family_mismatch_is_public() {
        let blocks = PrivateBlocks::parse(&["0.0.0.0/0"]).unwrap();
        assert!(blocks.is_private(ip("8.8.8.8")));
        assert!(blocks.is_public(ip("2001:db8::1")));
    }

    #[test]
    fn test_parse_invalid_block_fails() {
        let err = PrivateBlocks::parse(&["10.0.0.0/8", "10.0.0.0/99"]).unwrap_err();
        match err {
            AuditError::InvalidPrivateBlock { block, .. } => assert_eq!(block, "10.0.0.0/99"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_comma_list_entry() {
        let blocks = PrivateBlocks::parse(&["10.0.0.0/8, 100.64.0.0/10", "10.0.0.0/8"]).unwrap();
        assert_eq!(blocks.blocks().len(), 2);
        assert!(blocks.is_private(ip("100.64.3.3")));
    }
}
