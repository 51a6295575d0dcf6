//! HTTP client for a CloudAPI-compatible compute endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{normalize_mac, ComputeApi, Instance, Nic};
use crate::config::{Account, SecureString};

const API_VERSION: &str = "~8";

/// Page size for machine listings (CloudAPI maximum)
const PAGE_SIZE: usize = 1000;

/// Compute API client bound to one account
pub struct CloudApiClient {
    client: Client,
    base_url: Url,
    account_name: String,
    token: SecureString,
}

impl CloudApiClient {
    /// Create a client for an account, reading its credential file.
    ///
    /// `timeout` bounds each HTTP request; callers add their own deadline on
    /// top through [`super::CallGuard`].
    pub fn new(account: &Account, timeout: Duration) -> Result<Self> {
        let raw = std::fs::read_to_string(&account.key_path).with_context(|| {
            format!(
                "Failed to read credential file for account [{}]: {:?}",
                account.account_name, account.key_path
            )
        })?;
        let token = SecureString::new(raw.trim().to_string());
        if token.is_empty() {
            anyhow::bail!(
                "Credential file for account [{}] is empty: {:?}",
                account.account_name,
                account.key_path
            );
        }

        let base_url = Url::parse(&account.url)
            .with_context(|| format!("Invalid API URL: {}", account.url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API URL: {}", account.url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("nic-audit/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        debug!(
            "Compute client for {} at {} (key {})",
            account.account_name, base_url, account.key_id
        );

        Ok(Self {
            client,
            base_url,
            account_name: account.account_name.clone(),
            token,
        })
    }

    /// Build `<base>/<account>/<segments...>` with each segment escaped.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(&self.account_name)
                .extend(segments.iter().copied());
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/json")
            .header("Api-Version", API_VERSION)
            .bearer_auth(self.token.as_str())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .request(Method::GET, url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}", url, status);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid response body from {}", url))
    }
}

#[async_trait]
impl ComputeApi for CloudApiClient {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut offset = 0;

        loop {
            let mut url = self.endpoint(&["machines"]);
            url.query_pairs_mut()
                .append_pair("limit", &PAGE_SIZE.to_string())
                .append_pair("offset", &offset.to_string());

            let page: Vec<Instance> = self.get_json(url).await?;
            let count = page.len();
            instances.extend(page);

            if count < PAGE_SIZE {
                break;
            }
            offset += count;
        }

        debug!(
            "Listed {} instances for {}",
            instances.len(),
            self.account_name
        );
        Ok(instances)
    }

    async fn list_nics(&self, instance_id: &str) -> Result<Vec<Nic>> {
        self.get_json(self.endpoint(&["machines", instance_id, "nics"]))
            .await
    }

    async fn remove_nic(&self, instance_id: &str, mac: &str) -> Result<()> {
        let mac = normalize_mac(mac);
        let url = self.endpoint(&["machines", instance_id, "nics", &mac]);
        let response = self
            .request(Method::DELETE, url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("DELETE {} returned {}", url, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn account(url: &str, key_path: PathBuf) -> Account {
        Account {
            description: String::new(),
            url: url.to_string(),
            account_name: "ops team".to_string(),
            key_path,
            key_id: "aa:bb".to_string(),
            networks_to_remove: Vec::new(),
        }
    }

    fn key_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn client(url: &str) -> CloudApiClient {
        let key = key_file("token\n");
        CloudApiClient::new(
            &account(url, key.path().to_path_buf()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let c = client("https://cloudapi.example.com");
        assert_eq!(
            c.endpoint(&["machines"]).as_str(),
            "https://cloudapi.example.com/ops%20team/machines"
        );
    }

    #[test]
    fn test_endpoint_with_trailing_slash_and_prefix() {
        let c = client("https://example.com/api/");
        assert_eq!(
            c.endpoint(&["machines", "abc", "nics"]).as_str(),
            "https://example.com/api/ops%20team/machines/abc/nics"
        );
    }

    #[test]
    fn test_new_missing_key_file() {
        let result = CloudApiClient::new(
            &account(
                "https://cloudapi.example.com",
                PathBuf::from("/nonexistent/key"),
            ),
            Duration::from_secs(5),
        );
        let err = result.err().unwrap().to_string();
        assert!(err.contains("Failed to read credential file"));
    }

    #[test]
    fn test_new_empty_key_file() {
        let key = key_file("  \n");
        let result = CloudApiClient::new(
            &account("https://cloudapi.example.com", key.path().to_path_buf()),
            Duration::from_secs(5),
        );
        assert!(result.err().unwrap().to_string().contains("empty"));
    }

    #[test]
    fn test_new_invalid_url() {
        let key = key_file("token");
        let result = CloudApiClient::new(
            &account("not a url", key.path().to_path_buf()),
            Duration::from_secs(5),
        );
        assert!(result.err().unwrap().to_string().contains("Invalid API URL"));
    }
}
