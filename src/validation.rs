//! Centralized validation functions for nic-audit.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges
//! - Comma-delimited CIDR lists
//! - Credential file accessibility

use anyhow::Result;
use ipnet::IpNet;
use std::collections::HashSet;
use std::ffi::CString;
use std::net::IpAddr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::warn;

use crate::error::AuditError;

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use nic_audit::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("invalid").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))
}

/// Parse a single `address/prefix` CIDR literal.
///
/// Host bits are allowed (`192.168.0.7/24` is accepted); containment checks
/// always use the masked network.
///
/// # Examples
/// ```
/// use nic_audit::validation::parse_cidr;
/// assert!(parse_cidr("10.0.0.0/8").is_ok());
/// assert!(parse_cidr("10.0.0.1").is_err());
/// assert!(parse_cidr("172.16.0.0/99").is_err());
/// ```
pub fn parse_cidr(input: &str) -> Result<IpNet, AuditError> {
    let trimmed = input.trim();
    if !trimmed.contains('/') {
        return Err(AuditError::InvalidCidr {
            input: input.to_string(),
            reason: "missing prefix length".to_string(),
        });
    }
    trimmed.parse::<IpNet>().map_err(|e| AuditError::InvalidCidr {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a comma-delimited list of CIDRs.
///
/// A single literal without a comma must be valid. In a comma-delimited list
/// empty tokens are ignored, while invalid tokens and tokens whose network
/// duplicates an earlier one are skipped with a warning. Accepted networks are
/// returned in canonical (masked) form, in first-seen order.
///
/// # Examples
/// ```
/// use nic_audit::validation::parse_cidr_list;
/// let nets = parse_cidr_list("172.16.0.0/12,192.168.24.0/21,172.16.0.0/12").unwrap();
/// assert_eq!(nets.len(), 2);
/// assert!(parse_cidr_list("172.16.0.0/99").is_err());
/// ```
pub fn parse_cidr_list(input: &str) -> Result<Vec<IpNet>, AuditError> {
    if !input.contains(',') {
        return parse_cidr(input).map(|net| vec![net.trunc()]);
    }

    let mut seen = HashSet::new();
    let mut cidrs = Vec::new();

    for element in input.split(',') {
        let cidr = element.trim();
        if cidr.is_empty() {
            continue;
        }

        let net = match parse_cidr(cidr) {
            Ok(net) => net.trunc(),
            Err(_) => {
                warn!("Invalid CIDR specified: {}", cidr);
                continue;
            }
        };

        if !seen.insert(net) {
            warn!("Duplicate CIDR specified: {}", cidr);
            continue;
        }

        cidrs.push(net);
    }

    Ok(cidrs)
}

/// Determine whether a file can be read by the current process.
pub fn is_readable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: access() only reads the NUL-terminated path we own for the
    // duration of the call and does not retain the pointer.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

/// Check that a credential file exists and is readable.
pub fn validate_credential_file(path: &Path) -> Result<(), AuditError> {
    if !path.exists() {
        return Err(AuditError::CredentialFile {
            path: path.to_path_buf(),
            reason: "file doesn't exist".to_string(),
        });
    }
    if !is_readable(path) {
        return Err(AuditError::CredentialFile {
            path: path.to_path_buf(),
            reason: "file isn't accessible".to_string(),
        });
    }
    Ok(())
}
