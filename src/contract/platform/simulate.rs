//! Enclave-side behaviour of the token contracts for [`MemoryPlatform`].
//!
//! Enough of the token issuer and token object to run the full guardian
//! provisioning protocol in-process: packages are really decrypted with the
//! contract's keys and the token object really seals its capabilities.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::{InvocationRequest, MemoryContract, MemoryPlatform};
use crate::capability::{recv_secret, send_secret, EncryptionKey};
use crate::services::capability_request;
use crate::types::{
    CapabilityOperation, GuardianError, Result, SecretEnvelope, TokenIssuerPackage, TokenObjectPackage,
    TokenObjectRequest,
};

const MANAGEMENT_KEY: &str = "capability_management_key";
const GENERATION_KEY: &str = "capability_generation_key";
const MINTED_IDENTITY: &str = "minted_identity";

impl MemoryPlatform {
    /// Install responders that play the token issuer and token object
    pub fn simulate_token_contracts(&self) {
        self.respond_for("token_issuer", "initialize", issuer_initialize);
        self.respond_for("token_issuer", "add_endpoint", issuer_add_endpoint);
        self.respond_for("token_issuer", "provision_minted_token_object", issuer_provision_object);
        self.respond_for("token_object", "initialize", object_initialize);
        self.respond_for("token_object", "echo", object_echo);
    }
}

fn param<T: DeserializeOwned>(request: &InvocationRequest, key: &str) -> Result<T> {
    let value = request
        .param(key)
        .cloned()
        .ok_or_else(|| GuardianError::Validation(format!("{} requires {}", request.method, key)))?;
    serde_json::from_value(value)
        .map_err(|e| GuardianError::Validation(format!("{}: invalid {}: {}", request.method, key, e)))
}

fn stored_str(contract: &MemoryContract, key: &str) -> Result<String> {
    contract
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| GuardianError::Platform(format!("{} has no {}", contract.class_name, key)))
}

fn issuer_initialize(contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
    let envelope: SecretEnvelope = param(request, "initialization_package")?;
    let package: TokenIssuerPackage = serde_json::from_value(recv_secret(&contract.keys, &envelope)?)?;

    contract.set(MANAGEMENT_KEY, json!(package.capability_management_key));
    contract.set("token_description", param::<Value>(request, "token_description")?);
    contract.set("token_metadata", param::<Value>(request, "token_metadata")?);
    Ok(json!(true))
}

fn issuer_add_endpoint(contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
    let contract_id: String = param(request, "contract_id")?;
    let metadata: Value = param(request, "contract_metadata")?;
    contract.set(&format!("endpoint:{}", contract_id), metadata);
    Ok(json!(true))
}

fn issuer_provision_object(contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
    let contract_id: String = param(request, "contract_id")?;
    let endpoint = contract
        .get(&format!("endpoint:{}", contract_id))
        .ok_or_else(|| GuardianError::Platform(format!("token object {} not registered", contract_id)))?;

    let token_metadata = match contract.get("token_metadata") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let token_request = TokenObjectRequest {
        minted_identity: contract_id,
        token_description: stored_str(contract, "token_description")?,
        token_object_encryption_key: endpoint["encryption_key"].as_str().unwrap_or_default().to_string(),
        token_object_verifying_key: endpoint["verifying_key"].as_str().unwrap_or_default().to_string(),
        token_metadata,
    };

    let management_key = EncryptionKey::from_pem(&stored_str(contract, MANAGEMENT_KEY)?)?;
    let envelope = send_secret(&management_key, &serde_json::to_value(token_request)?)?;
    Ok(serde_json::to_value(envelope)?)
}

fn object_initialize(contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
    let envelope: SecretEnvelope = param(request, "initialization_package")?;
    let package: TokenObjectPackage = serde_json::from_value(recv_secret(&contract.keys, &envelope)?)?;

    contract.set(MINTED_IDENTITY, json!(package.minted_identity));
    contract.set(GENERATION_KEY, json!(package.capability_generation_key));
    Ok(json!(true))
}

fn object_echo(contract: &MemoryContract, request: &InvocationRequest) -> Result<Value> {
    let message: String = param(request, "message")?;
    let capability_key = EncryptionKey::from_pem(&stored_str(contract, GENERATION_KEY)?)?;

    let mut parameters = Map::new();
    parameters.insert("message".into(), json!(message));
    let operation = CapabilityOperation {
        nonce: uuid::Uuid::new_v4().to_string(),
        request_identifier: None,
        method_name: "echo".into(),
        parameters,
    };
    capability_request(&capability_key, &stored_str(contract, MINTED_IDENTITY)?, &operation)
}
