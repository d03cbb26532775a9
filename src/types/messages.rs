//! Wire messages shared by the guardian service, its client and the
//! contract command layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hybrid-encrypted container: a session key wrapped for the recipient plus
/// the message sealed under that session key. All fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretEnvelope {
    pub encrypted_session_key: String,
    pub session_key_iv: String,
    pub encrypted_message: String,
}

/// Ledger statement that a contract's code and metadata are committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAttestation {
    pub contract_code_hash: String,
    pub metadata_hash: String,
    pub signature: String,
}

/// Public keys of a contract enclave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub verifying_key: String,
    pub encryption_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMetadata {
    pub code_hash: String,
    pub code_nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEndpointRequest {
    pub contract_id: String,
    pub ledger_attestation: LedgerAttestation,
    pub contract_metadata: ContractMetadata,
    pub contract_code_metadata: CodeMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionTokenIssuerRequest {
    pub contract_id: String,
}

/// Secret sent by a token issuer to the guardian when minting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenObjectRequest {
    pub minted_identity: String,
    pub token_description: String,
    pub token_object_encryption_key: String,
    pub token_object_verifying_key: String,
    #[serde(default)]
    pub token_metadata: Map<String, Value>,
}

/// Secret returned to the token object after minting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenObjectPackage {
    pub minted_identity: String,
    pub token_description: String,
    pub token_metadata: Map<String, Value>,
    pub capability_generation_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIssuerPackage {
    pub capability_management_key: String,
}

/// Capability forwarded to `/process_capability`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityRequest {
    pub minted_identity: String,
    pub operation: SecretEnvelope,
}

/// Decrypted body of a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityOperation {
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_identifier: Option<String>,
    pub method_name: String,
    pub parameters: Map<String, Value>,
}

/// Response of `GET /info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub verifying_key: String,
    pub encryption_key: String,
    pub storage_service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
