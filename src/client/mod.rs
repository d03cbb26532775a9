//! Guardian service API and its clients.
//!
//! [`GuardianApi`] is the seam the contract commands talk through. The HTTP
//! client reaches a remote guardian; tests hand the in-process
//! [`GuardianService`](crate::services::GuardianService) to a
//! [`FixedGuardianConnector`] instead.

pub(crate) mod backoff;
mod http;

pub use http::GuardianClient;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{AddEndpointRequest, Result, SecretEnvelope, ServiceInfo};

#[async_trait::async_trait]
pub trait GuardianApi: Send + Sync {
    async fn info(&self) -> Result<ServiceInfo>;

    async fn add_endpoint(&self, request: &AddEndpointRequest) -> Result<()>;

    async fn provision_token_issuer(&self, contract_id: &str) -> Result<SecretEnvelope>;

    async fn provision_token_object(&self, secret: &SecretEnvelope) -> Result<SecretEnvelope>;

    async fn process_capability(&self, request: &Value) -> Result<Value>;
}

/// Resolves a guardian URL recorded in a context to an API handle
pub trait GuardianConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Arc<dyn GuardianApi>>;
}

pub struct HttpGuardianConnector {
    timeout: Duration,
}

impl HttpGuardianConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl GuardianConnector for HttpGuardianConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn GuardianApi>> {
        Ok(Arc::new(GuardianClient::with_timeout(url, self.timeout)?))
    }
}

/// Hands out the same guardian for every URL
pub struct FixedGuardianConnector(pub Arc<dyn GuardianApi>);

impl GuardianConnector for FixedGuardianConnector {
    fn connect(&self, _url: &str) -> Result<Arc<dyn GuardianApi>> {
        Ok(self.0.clone())
    }
}
