//! Error types for nic-audit.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Invalid criterion '{token}' in {owner}: must be a UUID, a CIDR or the string 'public'")]
    InvalidCriterion { token: String, owner: String },

    #[error("Rule group '{group}' has no criteria")]
    EmptyGroup { group: String },

    #[error("Invalid private network block '{block}': {reason}")]
    InvalidPrivateBlock { block: String, reason: String },

    #[error("Invalid CIDR '{input}': {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("Instance {instance_id}: network list {networks:?} doesn't match IP list {ips:?}")]
    MisalignedAttachments {
        instance_id: String,
        networks: Vec<String>,
        ips: Vec<String>,
    },

    #[error("Instance {instance_id}: invalid IP address '{address}'")]
    InvalidAddress { instance_id: String, address: String },

    #[error("Unable to use credential file {path:?}: {reason}")]
    CredentialFile { path: PathBuf, reason: String },

    #[error("{operation} failed: {reason}")]
    Api { operation: String, reason: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("{operation} cancelled by shutdown request")]
    Cancelled { operation: String },
}

impl AuditError {
    /// Whether this error should stop the rest of the run rather than a single instance.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AuditError::Cancelled { .. })
    }
}
