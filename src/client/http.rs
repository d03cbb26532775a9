use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::backoff::send_with_backoff;
use super::GuardianApi;
use crate::types::{
    AddEndpointRequest, GuardianError, ProvisionTokenIssuerRequest, Result, SecretEnvelope,
    ServiceInfo,
};

/// Default guardian request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for a guardian service
pub struct GuardianClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl GuardianClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardianError::Config(format!("guardian client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "POST to guardian");
        let response = send_with_backoff(|| self.http_client.post(&url).json(body)).await?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl GuardianApi for GuardianClient {
    async fn info(&self) -> Result<ServiceInfo> {
        let url = self.url("info");
        let response = send_with_backoff(|| self.http_client.get(&url)).await?;
        Ok(response.json().await?)
    }

    async fn add_endpoint(&self, request: &AddEndpointRequest) -> Result<()> {
        let _: Value = self.post("add_endpoint", request).await?;
        Ok(())
    }

    async fn provision_token_issuer(&self, contract_id: &str) -> Result<SecretEnvelope> {
        let request = ProvisionTokenIssuerRequest {
            contract_id: contract_id.to_string(),
        };
        self.post("provision_token_issuer", &request).await
    }

    async fn provision_token_object(&self, secret: &SecretEnvelope) -> Result<SecretEnvelope> {
        self.post("provision_token_object", secret).await
    }

    async fn process_capability(&self, request: &Value) -> Result<Value> {
        self.post("process_capability", request).await
    }
}
