//! Typed rule criteria.
//!
//! Every configured rule token is classified exactly once, when the
//! configuration is compiled. Matching code only ever sees [`Criterion`].

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

use crate::classifier::PrivateBlocks;
use crate::error::AuditError;
use crate::validation::{parse_cidr, parse_cidr_list};

/// Literal token selecting every public address.
pub const PUBLIC_TOKEN: &str = "public";

/// One parsed rule token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// A network identifier, stored in lowercase hyphenated form
    ExactNetwork(String),
    /// A single CIDR range
    CidrBlock(IpNet),
    /// Several CIDR ranges from one comma-delimited token
    CidrSet(Vec<IpNet>),
    /// Any address outside the configured private blocks
    Public,
}

impl Criterion {
    /// Classify a rule token: UUID first, then CIDR (or CIDR list), then the
    /// literal `public`.
    ///
    /// `owner` names the group or account the token belongs to and is only
    /// used for diagnostics.
    ///
    /// # Examples
    /// ```
    /// use nic_audit::criteria::Criterion;
    /// assert!(matches!(Criterion::parse("public", "test").unwrap(), Criterion::Public));
    /// assert!(matches!(Criterion::parse("10.0.0.0/8", "test").unwrap(), Criterion::CidrBlock(_)));
    /// assert!(Criterion::parse("private", "test").is_err());
    /// ```
    pub fn parse(token: &str, owner: &str) -> Result<Self, AuditError> {
        let trimmed = token.trim();
        let invalid = || AuditError::InvalidCriterion {
            token: token.to_string(),
            owner: owner.to_string(),
        };

        if let Ok(id) = Uuid::parse_str(trimmed) {
            return Ok(Criterion::ExactNetwork(id.hyphenated().to_string()));
        }

        if trimmed.contains(',') {
            let nets = parse_cidr_list(trimmed).map_err(|_| invalid())?;
            return match nets.len() {
                0 => Err(invalid()),
                1 => Ok(Criterion::CidrBlock(nets[0])),
                _ => Ok(Criterion::CidrSet(nets)),
            };
        }

        if let Ok(net) = parse_cidr(trimmed) {
            return Ok(Criterion::CidrBlock(net));
        }

        if trimmed == PUBLIC_TOKEN {
            return Ok(Criterion::Public);
        }

        Err(invalid())
    }

    /// Whether a match consumes every attachment on the matched network.
    pub fn consumes_network(&self) -> bool {
        !matches!(self, Criterion::ExactNetwork(_))
    }

    /// Test one attachment. `address` is `None` when the source reported an
    /// unparseable IP; such attachments never match address-based criteria.
    pub fn matches(
        &self,
        network_id: &str,
        address: Option<IpAddr>,
        private_blocks: &PrivateBlocks,
    ) -> bool {
        match self {
            Criterion::ExactNetwork(id) => network_id.eq_ignore_ascii_case(id),
            Criterion::CidrBlock(net) => address.is_some_and(|ip| net.contains(&ip)),
            Criterion::CidrSet(nets) => {
                address.is_some_and(|ip| nets.iter().any(|net| net.contains(&ip)))
            }
            Criterion::Public => address.is_some_and(|ip| private_blocks.is_public(ip)),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::ExactNetwork(id) => f.write_str(id),
            Criterion::CidrBlock(net) => write!(f, "{}", net),
            Criterion::CidrSet(nets) => {
                let joined: Vec<String> = nets.iter().map(|n| n.to_string()).collect();
                f.write_str(&joined.join(", "))
            }
            Criterion::Public => f.write_str(PUBLIC_TOKEN),
        }
    }
}

/// A named, ordered list of criteria. An instance matching every criterion
/// violates the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaGroup {
    pub name: String,
    pub criteria: Vec<Criterion>,
}

impl CriteriaGroup {
    /// Parse a rule group. Blank tokens are rejected, as is a group with no
    /// criteria (it would flag every instance).
    pub fn parse<S: AsRef<str>>(name: &str, tokens: &[S]) -> Result<Self, AuditError> {
        let owner = format!("group '{}'", name);
        let criteria = tokens
            .iter()
            .map(|t| Criterion::parse(t.as_ref(), &owner))
            .collect::<Result<Vec<_>, _>>()?;

        if criteria.is_empty() {
            return Err(AuditError::EmptyGroup {
                group: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            criteria,
        })
    }

    pub fn tokens(&self) -> Vec<String> {
        self.criteria.iter().map(|c| c.to_string()).collect()
    }
}

/// Parse an account's removal criteria, skipping blank tokens.
pub fn parse_removal_criteria<S: AsRef<str>>(
    account_name: &str,
    tokens: &[S],
) -> Result<Vec<Criterion>, AuditError> {
    let owner = format!("account '{}'", account_name);
    tokens
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| !t.trim().is_empty())
        .map(|t| Criterion::parse(t, &owner))
        .collect()
}
