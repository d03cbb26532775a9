//! In-process platform used by tests and dry runs.
//!
//! Every contract gets real signing and encryption keys so guardian
//! provisioning can run against it. Methods without a registered responder
//! record their parameters in the contract's state and return `true`.

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{compute_code_hash, ContractCode, ContractPlatform, CreateRequest, InvocationRequest, SaveFile};
use crate::capability::CapabilityKeys;
use crate::types::{GuardianError, LedgerAttestation, Result};

pub type Responder = Arc<dyn Fn(&MemoryContract, &InvocationRequest) -> Result<Value> + Send + Sync>;

/// A contract object held by [`MemoryPlatform`]
pub struct MemoryContract {
    pub contract_id: String,
    pub save_file: String,
    pub class_name: String,
    pub source: String,
    pub identity: String,
    pub keys: CapabilityKeys,
    state: Mutex<Map<String, Value>>,
}

impl MemoryContract {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        if let Ok(mut state) = self.state.lock() {
            state.insert(key.to_string(), value);
        }
    }

    fn state_digest(&self) -> String {
        let state = self.state.lock().map(|s| Value::Object(s.clone())).unwrap_or(Value::Null);
        compute_code_hash(&state.to_string(), &self.contract_id)
    }
}

#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub save_file: String,
    pub class_name: String,
    pub request: InvocationRequest,
    pub commit: bool,
}

pub struct MemoryPlatform {
    contracts: DashMap<String, Arc<MemoryContract>>,
    responders: DashMap<String, Responder>,
    invocations: Mutex<Vec<InvocationRecord>>,
    next_id: AtomicU64,
    ledger: CapabilityKeys,
    cache_dir: Option<PathBuf>,
}

impl MemoryPlatform {
    pub fn new() -> Result<Self> {
        Ok(Self {
            contracts: DashMap::new(),
            responders: DashMap::new(),
            invocations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            ledger: CapabilityKeys::create_new_keys()?,
            cache_dir: None,
        })
    }

    /// Also write a save file per created contract into `dir`
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Answer `method` on every contract class
    pub fn respond<F>(&self, method: &str, responder: F)
    where
        F: Fn(&MemoryContract, &InvocationRequest) -> Result<Value> + Send + Sync + 'static,
    {
        self.responders.insert(method.to_string(), Arc::new(responder));
    }

    /// Answer `method` on contracts of one class, ahead of class-wide responders
    pub fn respond_for<F>(&self, class_name: &str, method: &str, responder: F)
    where
        F: Fn(&MemoryContract, &InvocationRequest) -> Result<Value> + Send + Sync + 'static,
    {
        self.responders
            .insert(format!("{}.{}", class_name, method), Arc::new(responder));
    }

    pub fn contract(&self, save_file: &str) -> Option<Arc<MemoryContract>> {
        self.contracts.get(save_file).map(|c| Arc::clone(c.value()))
    }

    /// Number of contracts created for a class
    pub fn created(&self, class_name: &str) -> usize {
        self.contracts
            .iter()
            .filter(|c| c.value().class_name == class_name)
            .count()
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.invocations.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Invocations of one method, in order
    pub fn calls_to(&self, method: &str) -> Vec<InvocationRecord> {
        self.invocations()
            .into_iter()
            .filter(|call| call.request.method == method)
            .collect()
    }

    pub fn ledger_verifying_key(&self) -> String {
        self.ledger.verifying_key()
    }

    fn lookup(&self, save_file: &str) -> Result<Arc<MemoryContract>> {
        self.contract(save_file)
            .ok_or_else(|| GuardianError::Platform(format!("unknown save file {}", save_file)))
    }

    fn by_id(&self, contract_id: &str) -> Result<Arc<MemoryContract>> {
        self.contracts
            .iter()
            .find(|c| c.value().contract_id == contract_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| GuardianError::Platform(format!("unknown contract {}", contract_id)))
    }

    fn responder(&self, class_name: &str, method: &str) -> Option<Responder> {
        self.responders
            .get(&format!("{}.{}", class_name, method))
            .or_else(|| self.responders.get(method))
            .map(|r| Arc::clone(r.value()))
    }

    fn builtin(&self, contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
        match request.method.as_str() {
            "get_verifying_key" => Ok(json!(contract.keys.verifying_key())),
            "get_contract_metadata" => Ok(json!({
                "verifying_key": contract.keys.verifying_key(),
                "encryption_key": contract.keys.encryption_key_pem()?,
            })),
            "get_contract_code_metadata" => Ok(json!({
                "code_hash": compute_code_hash(&contract.source, &contract.class_name),
                "code_nonce": "",
            })),
            "get_ledger_key" => Ok(json!(self.ledger.verifying_key())),
            method => {
                contract.set(method, Value::Object(request.keyword.clone()));
                Ok(json!(true))
            }
        }
    }
}

#[async_trait::async_trait]
impl ContractPlatform for MemoryPlatform {
    async fn create_contract(&self, request: CreateRequest) -> Result<String> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let contract_id = compute_code_hash(&n.to_string(), &request.class_name);
        let save_file = format!("{}_{}.pdo", request.class_name, n);

        let keys = tokio::task::spawn_blocking(CapabilityKeys::create_new_keys)
            .await
            .map_err(|e| GuardianError::Internal(format!("key generation task failed: {e}")))??;

        if let Some(dir) = &self.cache_dir {
            SaveFile {
                contract_id: contract_id.clone(),
                class_name: request.class_name.clone(),
                identity: request.identity.clone(),
                data: Value::Null,
            }
            .write(dir, &save_file)
            .await?;
        }

        debug!(class = %request.class_name, save_file = %save_file, "Created in-memory contract");
        self.contracts.insert(
            save_file.clone(),
            Arc::new(MemoryContract {
                contract_id,
                save_file: save_file.clone(),
                class_name: request.class_name,
                source: request.source,
                identity: request.identity,
                keys,
                state: Mutex::new(Map::new()),
            }),
        );
        Ok(save_file)
    }

    async fn invoke(&self, save_file: &str, request: &InvocationRequest, commit: bool) -> Result<Value> {
        let contract = self.lookup(save_file)?;
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(InvocationRecord {
                save_file: save_file.to_string(),
                class_name: contract.class_name.clone(),
                request: request.clone(),
                commit,
            });
        }

        match self.responder(&contract.class_name, &request.method) {
            Some(responder) => responder(&contract, request),
            None => self.builtin(&contract, request),
        }
    }

    async fn contract_id(&self, save_file: &str) -> Result<String> {
        Ok(self.lookup(save_file)?.contract_id.clone())
    }

    async fn ledger_key(&self) -> Result<String> {
        Ok(self.ledger.verifying_key())
    }

    async fn ledger_attestation(&self, contract_id: &str) -> Result<LedgerAttestation> {
        let contract = self.by_id(contract_id)?;
        let contract_code_hash = compute_code_hash(&contract.source, &contract.class_name);
        let metadata_hash = compute_code_hash(&contract.keys.verifying_key(), &contract.keys.encryption_key_pem()?);
        let signature = self
            .ledger
            .sign(format!("{}{}{}", contract_id, contract_code_hash, metadata_hash).as_bytes());
        Ok(LedgerAttestation {
            contract_code_hash,
            metadata_hash,
            signature,
        })
    }

    async fn current_state_attestation(&self, contract_id: &str) -> Result<String> {
        let contract = self.by_id(contract_id)?;
        let digest = contract.state_digest();
        Ok(self.ledger.sign(format!("{}{}", contract_id, digest).as_bytes()))
    }

    async fn contract_code(&self, class_name: &str, source: &str) -> Result<ContractCode> {
        Ok(ContractCode {
            class_name: class_name.to_string(),
            code: source.to_string(),
        })
    }
}
