//! Platform gateway client.
//!
//! The gateway fronts the enclave and ledger services. Created contracts are
//! recorded as save files in the local contract cache; every later call
//! names the contract by the id stored there.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{save_file_name, ContractCode, ContractPlatform, CreateRequest, InvocationRequest, SaveFile};
use crate::client::backoff::send_with_backoff;
use crate::types::{GuardianError, LedgerAttestation, Result};

#[derive(Serialize)]
struct CreateBody<'a> {
    #[serde(flatten)]
    request: &'a CreateRequest,
    code: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    contract_id: String,
    #[serde(default)]
    save_data: Value,
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    identity: &'a str,
    request: &'a InvocationRequest,
    commit: bool,
}

#[derive(Deserialize)]
struct InvokeResponse {
    result: Value,
}

#[derive(Deserialize)]
struct LedgerKeyResponse {
    ledger_key: String,
}

#[derive(Deserialize)]
struct StateAttestationResponse {
    signature: String,
}

pub struct HttpPlatform {
    base_url: String,
    http_client: reqwest::Client,
    cache_dir: PathBuf,
    source_dirs: Vec<PathBuf>,
}

impl HttpPlatform {
    pub fn new(base_url: &str, timeout: Duration, cache_dir: PathBuf) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardianError::Config(format!("platform client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            cache_dir,
            source_dirs: Vec::new(),
        })
    }

    /// Directories searched for relative contract source paths
    pub fn with_source_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.source_dirs = dirs;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn find_source(&self, source: &str) -> Result<PathBuf> {
        let path = Path::new(source);
        if path.is_absolute() || path.exists() {
            return Ok(path.to_path_buf());
        }
        self.source_dirs
            .iter()
            .map(|dir| dir.join(source))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| GuardianError::Config(format!("contract source {} not found", source)))
    }
}

#[async_trait::async_trait]
impl ContractPlatform for HttpPlatform {
    async fn create_contract(&self, request: CreateRequest) -> Result<String> {
        let code = self.contract_code(&request.class_name, &request.source).await?;
        let url = self.url("contracts");
        let body = CreateBody {
            request: &request,
            code: &code.code,
        };

        let response = send_with_backoff(|| self.http_client.post(&url).json(&body)).await?;
        let created: CreateResponse = response.json().await?;

        let save_file = save_file_name(&request.class_name, &created.contract_id);
        SaveFile {
            contract_id: created.contract_id.clone(),
            class_name: request.class_name.clone(),
            identity: request.identity.clone(),
            data: created.save_data,
        }
        .write(&self.cache_dir, &save_file)
        .await?;

        info!(class = %request.class_name, contract_id = %created.contract_id, save_file = %save_file, "Created contract");
        Ok(save_file)
    }

    async fn invoke(&self, save_file: &str, request: &InvocationRequest, commit: bool) -> Result<Value> {
        let record = SaveFile::read(&self.cache_dir, save_file).await?;
        let url = self.url(&format!("contracts/{}/invoke", record.contract_id));
        let body = InvokeBody {
            identity: &record.identity,
            request,
            commit,
        };

        debug!(contract_id = %record.contract_id, method = %request.method, commit, "Invoking contract");
        let response = send_with_backoff(|| self.http_client.post(&url).json(&body)).await?;
        let reply: InvokeResponse = response.json().await?;
        Ok(reply.result)
    }

    async fn contract_id(&self, save_file: &str) -> Result<String> {
        Ok(SaveFile::read(&self.cache_dir, save_file).await?.contract_id)
    }

    async fn ledger_key(&self) -> Result<String> {
        let url = self.url("ledger/key");
        let response = send_with_backoff(|| self.http_client.get(&url)).await?;
        let reply: LedgerKeyResponse = response.json().await?;
        Ok(reply.ledger_key)
    }

    async fn ledger_attestation(&self, contract_id: &str) -> Result<LedgerAttestation> {
        let url = self.url(&format!("ledger/contracts/{}/attestation", contract_id));
        let response = send_with_backoff(|| self.http_client.get(&url)).await?;
        Ok(response.json().await?)
    }

    async fn current_state_attestation(&self, contract_id: &str) -> Result<String> {
        let url = self.url(&format!("ledger/contracts/{}/state_attestation", contract_id));
        let response = send_with_backoff(|| self.http_client.get(&url)).await?;
        let reply: StateAttestationResponse = response.json().await?;
        Ok(reply.signature)
    }

    async fn contract_code(&self, class_name: &str, source: &str) -> Result<ContractCode> {
        let path = self.find_source(source)?;
        let code = tokio::fs::read_to_string(&path).await.map_err(|e| {
            GuardianError::Config(format!("unable to read contract source {}: {}", path.display(), e))
        })?;
        Ok(ContractCode {
            class_name: class_name.to_string(),
            code,
        })
    }
}
