//! Configuration management for nic-audit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::classifier::{PrivateBlocks, RFC1918_BLOCKS};
use crate::criteria::{parse_removal_criteria, CriteriaGroup, Criterion};
use crate::validation::validate_credential_file;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nic-audit/config.yaml";

/// Environment variable consulted for the SMTP password
const SMTP_PASSWORD_ENV: &str = "NIC_AUDIT_SMTP_PASSWORD";

/// Secure string type that zeroizes memory on drop
/// Used for sensitive data like tokens and passwords
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where alert reports are emailed
    pub email_alerts: EmailAlerts,

    /// CIDR ranges considered private; everything else is "public".
    /// RFC1918 when absent; an empty list makes every address public.
    pub private_network_blocks: Option<Vec<String>>,

    /// Forbidden network combinations, by group name
    pub nic_groups: BTreeMap<String, Vec<String>>,

    /// Accounts to audit
    pub accounts: Vec<Account>,

    /// Deadline for each compute API call
    pub api_timeout_secs: u64,

    /// Number of accounts audited concurrently
    pub max_parallel_accounts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email_alerts: EmailAlerts::default(),
            private_network_blocks: None,
            nic_groups: BTreeMap::new(),
            accounts: Vec::new(),
            api_timeout_secs: 30,
            max_parallel_accounts: 1,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api_timeout_secs == 0 {
            anyhow::bail!("api_timeout_secs must be greater than zero");
        }

        if self.max_parallel_accounts == 0 {
            anyhow::bail!("max_parallel_accounts must be at least 1");
        }

        let mut names = HashSet::new();
        for account in &self.accounts {
            if account.account_name.is_empty() {
                anyhow::bail!("Account '{}' has no account_name", account.description);
            }
            if !names.insert(account.account_name.as_str()) {
                anyhow::bail!("Account '{}' is configured twice", account.account_name);
            }
            if !account.url.starts_with("https://") {
                anyhow::bail!(
                    "Account '{}' URL must use HTTPS: {}",
                    account.account_name,
                    account.url
                );
            }
        }

        if self.email_alerts.is_enabled() {
            if self.email_alerts.from.is_empty() {
                anyhow::bail!("email_alerts.from is required when smtp_server is set");
            }
            if self.email_alerts.to.is_empty() {
                anyhow::bail!("email_alerts.to needs at least one recipient");
            }
        }

        Ok(())
    }

    /// Parse every rule token and private block and check account
    /// credentials. Any failure here must stop the run before auditing.
    pub fn compile(&self) -> Result<RuleSet> {
        let private_blocks = match &self.private_network_blocks {
            Some(blocks) => PrivateBlocks::parse(blocks)?,
            None => {
                info!(
                    "private_network_blocks not set, treating {} as private",
                    RFC1918_BLOCKS.join(", ")
                );
                PrivateBlocks::rfc1918()
            }
        };

        let groups = self
            .nic_groups
            .iter()
            .map(|(name, tokens)| CriteriaGroup::parse(name, tokens))
            .collect::<Result<Vec<_>, _>>()?;

        let mut accounts = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            validate_credential_file(&account.key_path).with_context(|| {
                format!("Unable to audit account [{}]", account.account_name)
            })?;
            let removal_criteria =
                parse_removal_criteria(&account.account_name, &account.networks_to_remove)?;
            accounts.push(AccountRules {
                account: account.clone(),
                removal_criteria,
            });
        }

        Ok(RuleSet {
            private_blocks,
            groups,
            accounts,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailAlerts {
    /// SMTP relay host; alert email is disabled when empty
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Optional SMTP user; when set the connection uses TLS and authenticates
    pub smtp_user: String,
    /// Password can be set directly or via NIC_AUDIT_SMTP_PASSWORD env var
    /// Memory is securely zeroed when dropped
    pub smtp_password: SecureString,
    /// Environment variable name to read password from (optional)
    pub smtp_password_env: Option<String>,
    pub from: String,
    pub from_name: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
}

impl Default for EmailAlerts {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: 25,
            smtp_user: String::new(),
            smtp_password: SecureString::default(),
            smtp_password_env: None,
            from: String::new(),
            from_name: "NIC Audit".to_string(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: "Offending network combinations found".to_string(),
        }
    }
}

impl EmailAlerts {
    pub fn is_enabled(&self) -> bool {
        !self.smtp_server.is_empty()
    }

    /// Get the effective password, checking env var first if configured
    /// Returns a SecureString that will be zeroed when dropped
    pub fn get_password(&self) -> SecureString {
        if let Some(ref env_name) = self.smtp_password_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(SMTP_PASSWORD_ENV) {
            return SecureString::new(val);
        }
        self.smtp_password.clone()
    }
}

/// A single cloud account to audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub description: String,
    /// Compute API endpoint
    #[serde(alias = "triton_url")]
    pub url: String,
    pub account_name: String,
    /// File holding the API credential for this account
    pub key_path: PathBuf,
    #[serde(default)]
    pub key_id: String,
    /// Criteria selecting NICs to detach from violating instances
    #[serde(default)]
    pub networks_to_remove: Vec<String>,
}

/// Configuration with every rule token parsed.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub private_blocks: PrivateBlocks,
    /// Sorted by group name
    pub groups: Vec<CriteriaGroup>,
    pub accounts: Vec<AccountRules>,
}

#[derive(Debug, Clone)]
pub struct AccountRules {
    pub account: Account,
    pub removal_criteria: Vec<Criterion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn key_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "secret-token").unwrap();
        file
    }

    fn account(name: &str, key_path: &Path) -> Account {
        Account {
            description: format!("{} account", name),
            url: "https://cloudapi.example.com".to_string(),
            account_name: name.to_string(),
            key_path: key_path.to_path_buf(),
            key_id: "aa:bb".to_string(),
            networks_to_remove: Vec::new(),
        }
    }

    const SAMPLE: &str = r#"
email_alerts:
  smtp_server: smtp.example.com
  from: audit@example.com
  to: [ops@example.com]
private_network_blocks:
  - 10.0.0.0/8
  - 172.16.0.0/12, 192.168.0.0/16
nic_groups:
  public-and-admin:
    - public
    - 70294144-7680-43d2-9ed0-897ce1658f80
accounts:
  - description: Production
    triton_url: https://us-east-1.api.example.com
    account_name: prod
    key_path: /tmp/nonexistent-key
    key_id: "aa:bb:cc"
    networks_to_remove:
      - public
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_timeout_secs, 30);
        assert_eq!(config.max_parallel_accounts, 1);
        assert!(config.private_network_blocks.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.email_alerts.is_enabled());
        assert_eq!(config.email_alerts.smtp_port, 25);
        assert_eq!(config.nic_groups["public-and-admin"].len(), 2);
        assert_eq!(config.accounts[0].url, "https://us-east-1.api.example.com");
        assert_eq!(config.accounts[0].networks_to_remove, vec!["public"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.accounts.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/nic-audit.yaml");
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"accounts: [this is: not valid").unwrap();
        let result = Config::load(file.path());
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_validation_http_url_rejected() {
        let key = key_file();
        let mut acct = account("dev", key.path());
        acct.url = "http://cloudapi.example.com".to_string();
        let config = Config {
            accounts: vec![acct],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("HTTPS"));
    }

    #[test]
    fn test_validation_duplicate_account() {
        let key = key_file();
        let config = Config {
            accounts: vec![account("dev", key.path()), account("dev", key.path())],
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("configured twice"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = Config {
            api_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_email_requires_recipients() {
        let config = Config {
            email_alerts: EmailAlerts {
                smtp_server: "smtp.example.com".to_string(),
                from: "audit@example.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("to"));
    }

    #[test]
    fn test_compile_valid() {
        let key = key_file();
        let mut acct = account("dev", key.path());
        acct.networks_to_remove = vec!["".to_string(), "public".to_string()];
        let mut groups = BTreeMap::new();
        groups.insert("zeta".to_string(), vec!["public".to_string()]);
        groups.insert("alpha".to_string(), vec!["10.0.0.0/8".to_string()]);
        let config = Config {
            nic_groups: groups,
            accounts: vec![acct],
            ..Default::default()
        };

        let rules = config.compile().unwrap();
        assert_eq!(rules.private_blocks.blocks().len(), 3);
        let names: Vec<_> = rules.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(rules.accounts[0].removal_criteria, vec![Criterion::Public]);
    }

    #[test]
    fn test_compile_private_blocks_absent_uses_rfc1918() {
        let config: Config = serde_yaml::from_str("nic_groups: {}\n").unwrap();
        let rules = config.compile().unwrap();
        assert_eq!(rules.private_blocks, PrivateBlocks::rfc1918());
    }

    #[test]
    fn test_compile_private_blocks_empty_means_all_public() {
        let config: Config = serde_yaml::from_str("private_network_blocks: []\n").unwrap();
        let rules = config.compile().unwrap();
        assert!(rules.private_blocks.blocks().is_empty());
        assert!(rules.private_blocks.is_public("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_compile_invalid_group_token() {
        let mut groups = BTreeMap::new();
        groups.insert("bad".to_string(), vec!["not-a-network".to_string()]);
        let config = Config {
            nic_groups: groups,
            ..Default::default()
        };
        let err = config.compile().unwrap_err().to_string();
        assert!(err.contains("not-a-network"));
        assert!(err.contains("group 'bad'"));
    }

    #[test]
    fn test_compile_invalid_private_block() {
        let config = Config {
            private_network_blocks: Some(vec!["10.0.0.0/33".to_string()]),
            ..Default::default()
        };
        assert!(config
            .compile()
            .unwrap_err()
            .to_string()
            .contains("private network block"));
    }

    #[test]
    fn test_compile_missing_key_file() {
        let config = Config {
            accounts: vec![account("dev", Path::new("/nonexistent/key"))],
            ..Default::default()
        };
        let err = format!("{:#}", config.compile().unwrap_err());
        assert!(err.contains("Unable to audit account [dev]"));
        assert!(err.contains("doesn't exist"));
    }

    #[test]
    fn test_compile_invalid_removal_token() {
        let key = key_file();
        let mut acct = account("dev", key.path());
        acct.networks_to_remove = vec!["everything".to_string()];
        let config = Config {
            accounts: vec![acct],
            ..Default::default()
        };
        assert!(config
            .compile()
            .unwrap_err()
            .to_string()
            .contains("account 'dev'"));
    }

    #[test]
    fn test_secure_string_debug_redacted() {
        let secret = SecureString::new("my-secret-token".to_string());
        let debug_str = format!("{:?}", secret);
        assert_eq!(debug_str, "[REDACTED]");
        assert!(!debug_str.contains("my-secret-token"));
    }

    #[test]
    fn test_secure_string_from_str() {
        let secure: SecureString = "test".into();
        assert_eq!(secure.as_str(), "test");
        assert!(!secure.is_empty());
    }

    #[test]
    fn test_email_password_from_config() {
        let alerts = EmailAlerts {
            smtp_password: "pw".into(),
            smtp_password_env: Some("NIC_AUDIT_TEST_UNSET_VARIABLE".to_string()),
            ..Default::default()
        };
        // Skip when the default env var is set in the environment running tests
        if env::var(SMTP_PASSWORD_ENV).is_err() {
            assert_eq!(alerts.get_password().as_str(), "pw");
        }
    }
}
