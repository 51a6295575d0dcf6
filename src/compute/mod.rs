//! Compute API collaborator: instance and NIC inventory, NIC removal.

mod cloudapi;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

pub use cloudapi::CloudApiClient;

use crate::error::AuditError;
use crate::matcher::{attachments_from_parallel, NetworkAttachment};
use crate::signal::ShutdownToken;

/// A compute instance as reported by the API.
///
/// `networks` and `ips` are index-aligned: entry `i` of each describes the
/// same NIC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub firewall_enabled: bool,
}

impl Instance {
    pub fn attachments(&self) -> Result<Vec<NetworkAttachment>, AuditError> {
        attachments_from_parallel(&self.id, &self.networks, &self.ips)
    }
}

/// A live network interface on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    pub mac: String,
    #[serde(rename = "network")]
    pub network_id: String,
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(default)]
    pub primary: bool,
}

/// Canonical MAC form: lowercase hex digits without separators. This is the
/// form CloudAPI uses in NIC paths.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_lowercase()
}

/// Trait for compute API clients. One client is bound to one account.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// List every instance in the account
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// List the NICs currently attached to an instance
    async fn list_nics(&self, instance_id: &str) -> Result<Vec<Nic>>;

    /// Detach the NIC with the given MAC from an instance
    async fn remove_nic(&self, instance_id: &str, mac: &str) -> Result<()>;
}

/// Applies a deadline and the shutdown token to every API call.
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    token: ShutdownToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, token: ShutdownToken) -> Self {
        Self { timeout, token }
    }

    pub fn token(&self) -> &ShutdownToken {
        &self.token
    }

    /// Run one API call, mapping failures to typed errors.
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, AuditError>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(AuditError::Cancelled {
                operation: operation.to_string(),
            });
        }

        tokio::select! {
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(AuditError::Api {
                    operation: operation.to_string(),
                    reason: format!("{:#}", e),
                }),
                Err(_) => Err(AuditError::Timeout {
                    operation: operation.to_string(),
                    secs: self.timeout.as_secs(),
                }),
            },
            _ = self.token.cancelled() => Err(AuditError::Cancelled {
                operation: operation.to_string(),
            }),
        }
    }
}
