//! Guardian service.
//!
//! Owns the capability key store, the endpoint registry, the replay
//! registry and the handler table. Every HTTP route is a thin wrapper over
//! one method here, and the same methods serve in-process callers through
//! [`GuardianApi`].

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::capability::{
    recv_secret, send_secret, CapabilityKeyStore, EncryptionKey, EndpointRecord, EndpointRegistry,
    RequestRegistry,
};
use crate::client::GuardianApi;
use crate::handlers::HandlerMap;
use crate::types::{
    AddEndpointRequest, CapabilityOperation, CapabilityRequest, GuardianError, Result,
    SecretEnvelope, ServiceInfo, TokenIssuerPackage, TokenObjectPackage, TokenObjectRequest,
};

/// Settings the service reads at request time
#[derive(Debug, Clone, Default)]
pub struct GuardianSettings {
    pub storage_service_url: String,
    pub allowed_code_hashes: Vec<String>,
    pub allowed_contract_ids: Vec<String>,
}

impl GuardianSettings {
    fn endpoint_allowed(&self, code_hash: &str, contract_id: &str) -> bool {
        if self.allowed_code_hashes.is_empty() && self.allowed_contract_ids.is_empty() {
            return true;
        }
        self.allowed_code_hashes.iter().any(|h| h == code_hash)
            || self.allowed_contract_ids.iter().any(|c| c == contract_id)
    }
}

pub struct GuardianService {
    keys: Arc<CapabilityKeyStore>,
    endpoints: EndpointRegistry,
    replay: RequestRegistry,
    handlers: HandlerMap,
    settings: GuardianSettings,
}

impl GuardianService {
    pub fn new(
        keys: Arc<CapabilityKeyStore>,
        endpoints: EndpointRegistry,
        handlers: HandlerMap,
        settings: GuardianSettings,
    ) -> Self {
        info!(
            operations = ?handlers.method_names(),
            allow_list = !settings.allowed_code_hashes.is_empty() || !settings.allowed_contract_ids.is_empty(),
            "Guardian service initialized"
        );
        Self {
            keys,
            endpoints,
            replay: RequestRegistry::new(),
            handlers,
            settings,
        }
    }

    pub fn key_store(&self) -> &CapabilityKeyStore {
        &self.keys
    }

    pub fn service_info(&self) -> Result<ServiceInfo> {
        let service_key = self.keys.service_key();
        Ok(ServiceInfo {
            verifying_key: service_key.verifying_key(),
            encryption_key: service_key.encryption_key_pem()?,
            storage_service_url: self.settings.storage_service_url.clone(),
        })
    }

    pub fn register_endpoint(&self, request: &AddEndpointRequest) -> Result<()> {
        let code_hash = &request.contract_code_metadata.code_hash;
        if !self.settings.endpoint_allowed(code_hash, &request.contract_id) {
            warn!(contract_id = %request.contract_id, code_hash = %code_hash, "Endpoint rejected by allow-list");
            return Err(GuardianError::Unauthorized("endpoint not authorized".into()));
        }

        // Reject keys we could never encrypt to
        EncryptionKey::from_pem(&request.contract_metadata.encryption_key)?;

        self.endpoints.register(&EndpointRecord {
            contract_id: request.contract_id.clone(),
            verifying_key: request.contract_metadata.verifying_key.clone(),
            encryption_key: request.contract_metadata.encryption_key.clone(),
            code_hash: code_hash.clone(),
            registered_at: Utc::now(),
        })
    }

    /// Send the management encryption key to a registered token issuer
    pub fn provision_issuer(&self, contract_id: &str) -> Result<SecretEnvelope> {
        let endpoint = self.endpoints.get(contract_id)?;
        let recipient = EncryptionKey::from_pem(&endpoint.encryption_key)?;

        let package = TokenIssuerPackage {
            capability_management_key: self.keys.management_key().encryption_key_pem()?,
        };
        info!(contract_id, "Provisioning token issuer");
        send_secret(&recipient, &serde_json::to_value(package)?)
    }

    /// Create the capability key for a newly minted token object
    pub async fn provision_object(&self, secret: &SecretEnvelope) -> Result<SecretEnvelope> {
        let management_key = self.keys.management_key();
        let message = recv_secret(&management_key, secret)?;
        let request: TokenObjectRequest = serde_json::from_value(message)
            .map_err(|e| GuardianError::Validation(format!("invalid JSON: {e}")))?;

        let recipient = EncryptionKey::from_pem(&request.token_object_encryption_key)?;

        let keys = self.keys.clone();
        let identity = request.minted_identity.clone();
        let capability_key = tokio::task::spawn_blocking(move || keys.create_capability_key(&identity))
            .await
            .map_err(|e| GuardianError::Internal(format!("key generation task failed: {e}")))??;

        info!(minted_identity = %request.minted_identity, "Provisioned token object");

        let package = TokenObjectPackage {
            minted_identity: request.minted_identity,
            token_description: request.token_description,
            token_metadata: request.token_metadata,
            capability_generation_key: capability_key.encryption_key_pem()?,
        };
        send_secret(&recipient, &serde_json::to_value(package)?)
    }

    /// Decrypt, check and dispatch one capability
    pub async fn process(&self, request: &Value) -> Result<Value> {
        let request: CapabilityRequest = serde_json::from_value(request.clone())
            .map_err(|_| GuardianError::Validation("invalid JSON, malformed request".into()))?;
        let minted_identity = request.minted_identity.as_str();

        let capability_key = self.keys.get_capability_key(minted_identity)?;
        let message = recv_secret(&capability_key, &request.operation)?;
        let operation: CapabilityOperation = serde_json::from_value(message)
            .map_err(|_| GuardianError::Validation("invalid JSON, malformed operation".into()))?;

        info!(
            minted_identity,
            method = %operation.method_name,
            "Processing capability operation"
        );

        let handler = self
            .handlers
            .get(&operation.method_name)
            .ok_or_else(|| GuardianError::UnknownOperation(operation.method_name.clone()))?;

        if handler.unique_requests() {
            let request_identifier = operation
                .request_identifier
                .as_deref()
                .ok_or(GuardianError::MissingRequestIdentifier)?;
            if !self.replay.check_and_record(minted_identity, request_identifier) {
                warn!(minted_identity, request_identifier, "Duplicate request for unique operation");
                return Err(GuardianError::DuplicateRequest);
            }
        }

        match handler.call(&operation.parameters).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                debug!(method = %operation.method_name, "Operation returned no result");
                Err(GuardianError::OperationFailed)
            }
            Err(e) => {
                error!(method = %operation.method_name, error = %e, "Operation raised an error");
                Err(GuardianError::OperationError)
            }
        }
    }

    pub fn close(&self) -> Result<()> {
        self.keys.close()?;
        self.endpoints.close()
    }
}

#[async_trait::async_trait]
impl GuardianApi for GuardianService {
    async fn info(&self) -> Result<ServiceInfo> {
        self.service_info()
    }

    async fn add_endpoint(&self, request: &AddEndpointRequest) -> Result<()> {
        self.register_endpoint(request)
    }

    async fn provision_token_issuer(&self, contract_id: &str) -> Result<SecretEnvelope> {
        self.provision_issuer(contract_id)
    }

    async fn provision_token_object(&self, secret: &SecretEnvelope) -> Result<SecretEnvelope> {
        self.provision_object(secret).await
    }

    async fn process_capability(&self, request: &Value) -> Result<Value> {
        self.process(request).await
    }
}

/// Build the JSON body a token object sends to `/process_capability`
pub fn capability_request(
    capability_key: &EncryptionKey,
    minted_identity: &str,
    operation: &CapabilityOperation,
) -> Result<Value> {
    let envelope = send_secret(capability_key, &serde_json::to_value(operation)?)?;
    Ok(json!({
        "minted_identity": minted_identity,
        "operation": envelope,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityKeys, MemoryStore};
    use crate::handlers::{CapabilityHandler, Parameters};
    use crate::types::{CodeMetadata, ContractMetadata, LedgerAttestation};
    use serde_json::Map;

    struct ValueHandler {
        unique: bool,
    }

    #[async_trait::async_trait]
    impl CapabilityHandler for ValueHandler {
        fn unique_requests(&self) -> bool {
            self.unique
        }

        async fn call(&self, parameters: &Parameters) -> Result<Option<Value>> {
            if parameters.contains_key("fail") {
                return Ok(None);
            }
            if parameters.contains_key("explode") {
                return Err(GuardianError::Internal("boom".into()));
            }
            Ok(Some(json!({ "value": 42 })))
        }
    }

    fn service(settings: GuardianSettings) -> GuardianService {
        let keys = Arc::new(CapabilityKeyStore::open(Arc::new(MemoryStore::new())).unwrap());
        let mut handlers = HandlerMap::new();
        handlers.register("get_value", ValueHandler { unique: false });
        handlers.register("spend", ValueHandler { unique: true });
        GuardianService::new(
            keys,
            EndpointRegistry::new(Arc::new(MemoryStore::new())),
            handlers,
            settings,
        )
    }

    fn operation(method: &str, request_identifier: Option<&str>, parameters: Value) -> CapabilityOperation {
        CapabilityOperation {
            nonce: "n1".into(),
            request_identifier: request_identifier.map(str::to_string),
            method_name: method.into(),
            parameters: parameters.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    fn endpoint_request(contract_id: &str, code_hash: &str, keys: &CapabilityKeys) -> AddEndpointRequest {
        AddEndpointRequest {
            contract_id: contract_id.into(),
            ledger_attestation: LedgerAttestation {
                contract_code_hash: code_hash.into(),
                metadata_hash: "mh".into(),
                signature: "sig".into(),
            },
            contract_metadata: ContractMetadata {
                verifying_key: keys.verifying_key(),
                encryption_key: keys.encryption_key_pem().unwrap(),
            },
            contract_code_metadata: CodeMetadata {
                code_hash: code_hash.into(),
                code_nonce: "nonce".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_process_capability_dispatch() {
        let service = service(GuardianSettings::default());
        let user = service.key_store().create_capability_key("user1").unwrap();

        let request = capability_request(
            user.encryption_key(),
            "user1",
            &operation("get_value", None, json!({})),
        )
        .unwrap();
        assert_eq!(service.process(&request).await.unwrap(), json!({ "value": 42 }));
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let service = service(GuardianSettings::default());
        let user = service.key_store().create_capability_key("user1").unwrap();

        let first = capability_request(user.encryption_key(), "user1", &operation("spend", Some("r1"), json!({ "a": 1 }))).unwrap();
        let replay = capability_request(user.encryption_key(), "user1", &operation("spend", Some("r1"), json!({ "b": 2 }))).unwrap();

        assert!(service.process(&first).await.is_ok());
        assert!(matches!(
            service.process(&replay).await,
            Err(GuardianError::DuplicateRequest)
        ));
    }

    #[tokio::test]
    async fn test_unique_operation_requires_identifier() {
        let service = service(GuardianSettings::default());
        let user = service.key_store().create_capability_key("user1").unwrap();
        let request = capability_request(user.encryption_key(), "user1", &operation("spend", None, json!({}))).unwrap();
        assert!(matches!(
            service.process(&request).await,
            Err(GuardianError::MissingRequestIdentifier)
        ));
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let service = service(GuardianSettings::default());
        let user = service.key_store().create_capability_key("user1").unwrap();
        let key = user.encryption_key();

        let unknown = capability_request(key, "user1", &operation("nope", None, json!({}))).unwrap();
        assert!(matches!(service.process(&unknown).await, Err(GuardianError::UnknownOperation(_))));

        let failed = capability_request(key, "user1", &operation("get_value", None, json!({ "fail": true }))).unwrap();
        assert!(matches!(service.process(&failed).await, Err(GuardianError::OperationFailed)));

        let exploded = capability_request(key, "user1", &operation("get_value", None, json!({ "explode": true }))).unwrap();
        let raised = service.process(&exploded).await.unwrap_err();
        assert!(matches!(raised, GuardianError::OperationError));
        assert_eq!(raised.status_code(), hyper::StatusCode::BAD_REQUEST);

        let stranger = capability_request(key, "user2", &operation("get_value", None, json!({}))).unwrap();
        assert!(matches!(service.process(&stranger).await, Err(GuardianError::UnknownIdentity(_))));

        let malformed = json!({ "minted_identity": "user1" });
        assert!(matches!(service.process(&malformed).await, Err(GuardianError::Validation(_))));

        // Well-formed envelope, but the operation is missing its nonce
        let envelope = send_secret(key, &json!({ "method_name": "get_value", "parameters": {} })).unwrap();
        let bad_operation = json!({ "minted_identity": "user1", "operation": envelope });
        assert!(matches!(service.process(&bad_operation).await, Err(GuardianError::Validation(_))));
    }

    #[tokio::test]
    async fn test_allow_list() {
        let service = service(GuardianSettings {
            allowed_code_hashes: vec!["good-hash".into()],
            ..Default::default()
        });
        let issuer = CapabilityKeys::create_new_keys().unwrap();

        assert!(matches!(
            service.register_endpoint(&endpoint_request("c1", "bad-hash", &issuer)),
            Err(GuardianError::Unauthorized(_))
        ));
        service
            .register_endpoint(&endpoint_request("c1", "good-hash", &issuer))
            .unwrap();
    }

    #[tokio::test]
    async fn test_provisioning_flow() {
        let service = service(GuardianSettings::default());

        // Token issuer registers and receives the management key
        let issuer = CapabilityKeys::create_new_keys().unwrap();
        service.register_endpoint(&endpoint_request("issuer", "h", &issuer)).unwrap();
        let package = service.provision_issuer("issuer").unwrap();
        let package: TokenIssuerPackage =
            serde_json::from_value(recv_secret(&issuer, &package).unwrap()).unwrap();
        let management = EncryptionKey::from_pem(&package.capability_management_key).unwrap();

        // Token issuer asks for a capability key for a minted object
        let token = CapabilityKeys::create_new_keys().unwrap();
        let request = TokenObjectRequest {
            minted_identity: "token_1".into(),
            token_description: "a token".into(),
            token_object_encryption_key: token.encryption_key_pem().unwrap(),
            token_object_verifying_key: token.verifying_key(),
            token_metadata: Map::new(),
        };
        let secret = send_secret(&management, &serde_json::to_value(&request).unwrap()).unwrap();
        let reply = service.provision_object(&secret).await.unwrap();
        let package: TokenObjectPackage =
            serde_json::from_value(recv_secret(&token, &reply).unwrap()).unwrap();
        assert_eq!(package.minted_identity, "token_1");

        // The token object can now issue capabilities
        let capability_key = EncryptionKey::from_pem(&package.capability_generation_key).unwrap();
        let capability = capability_request(&capability_key, "token_1", &operation("get_value", None, json!({}))).unwrap();
        assert_eq!(service.process(&capability).await.unwrap(), json!({ "value": 42 }));

        assert!(matches!(
            service.provision_issuer("unknown"),
            Err(GuardianError::UnknownEndpoint(_))
        ));
    }
}
