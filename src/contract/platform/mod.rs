//! The contract execution platform seam.
//!
//! Everything the command layer needs from the external platform goes
//! through [`ContractPlatform`]: creating contract objects, invoking their
//! methods and reading ledger attestations. [`HttpPlatform`] talks to a
//! platform gateway; [`MemoryPlatform`] is an in-process fake.

mod http;
mod memory;
mod simulate;

pub use http::HttpPlatform;
pub use memory::{InvocationRecord, MemoryContract, MemoryPlatform, Responder};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::types::{GuardianError, LedgerAttestation, Result};

#[async_trait::async_trait]
pub trait ContractPlatform: Send + Sync {
    /// Allocate a new contract object, returning its save file name
    async fn create_contract(&self, request: CreateRequest) -> Result<String>;

    /// Send a method invocation to the contract recorded in `save_file`
    async fn invoke(&self, save_file: &str, request: &InvocationRequest, commit: bool) -> Result<Value>;

    async fn contract_id(&self, save_file: &str) -> Result<String>;

    /// Ledger verifying key, the root of trust for contract attestations
    async fn ledger_key(&self) -> Result<String>;

    async fn ledger_attestation(&self, contract_id: &str) -> Result<LedgerAttestation>;

    /// Ledger signature over the contract's current committed state
    async fn current_state_attestation(&self, contract_id: &str) -> Result<String>;

    /// Load the compiled code for a contract class
    async fn contract_code(&self, class_name: &str, source: &str) -> Result<ContractCode>;
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub class_name: String,
    pub source: String,
    pub identity: String,
    pub eservice_group: String,
    pub pservice_group: String,
    pub sservice_group: String,
}

impl CreateRequest {
    pub fn new(class_name: &str, source: &str, identity: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            source: source.to_string(),
            identity: identity.to_string(),
            eservice_group: "default".to_string(),
            pservice_group: "default".to_string(),
            sservice_group: "default".to_string(),
        }
    }

    /// Read identity, source and service groups from a contract context
    pub fn from_context(context: &Context, class_name: &str) -> Result<Self> {
        let group = |key: &str| -> Result<String> {
            Ok(context.get_str(key)?.unwrap_or_else(|| "default".to_string()))
        };
        Ok(Self {
            class_name: class_name.to_string(),
            source: context.require_str("source")?,
            identity: context.require_str("identity")?,
            eservice_group: group("eservice_group")?,
            pservice_group: group("pservice_group")?,
            sservice_group: group("sservice_group")?,
        })
    }
}

/// Method invocation in the platform's wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "PositionalParameters", default)]
    pub positional: Vec<Value>,
    #[serde(rename = "KeywordParameters", default)]
    pub keyword: Map<String, Value>,
}

impl InvocationRequest {
    pub fn keyword(method: &str, keyword: Map<String, Value>) -> Self {
        Self {
            method: method.to_string(),
            positional: Vec::new(),
            keyword,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    pub fn str_param(&self, key: &str) -> Result<&str> {
        self.keyword
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| GuardianError::Validation(format!("{} requires string {}", self.method, key)))
    }
}

// =============================================================================
// Contract code
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCode {
    pub class_name: String,
    pub code: String,
}

impl ContractCode {
    pub fn code_hash(&self) -> String {
        compute_code_hash(&self.code, &self.class_name)
    }
}

/// base64(SHA-256(code || class name))
pub fn compute_code_hash(code: &str, class_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(class_name.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Persisted handle on a created contract object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub contract_id: String,
    pub class_name: String,
    pub identity: String,
    #[serde(default)]
    pub data: Value,
}

impl SaveFile {
    pub fn path_in(cache_dir: &Path, save_file: &str) -> PathBuf {
        cache_dir.join(save_file)
    }

    pub async fn read(cache_dir: &Path, save_file: &str) -> Result<Self> {
        let path = Self::path_in(cache_dir, save_file);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            GuardianError::Platform(format!("unable to read save file {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write(&self, cache_dir: &Path, save_file: &str) -> Result<()> {
        tokio::fs::create_dir_all(cache_dir).await?;
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(Self::path_in(cache_dir, save_file), bytes).await?;
        Ok(())
    }
}

/// Save file name for a new contract: class plus a short id prefix
pub fn save_file_name(class_name: &str, contract_id: &str) -> String {
    let short: String = contract_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect();
    format!("{}_{}.pdo", class_name, short)
}
