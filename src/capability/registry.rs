//! Endpoint registry: contract id to the enclave keys registered through
//! `/add_endpoint`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::keystore::KeyValueStore;
use crate::types::{GuardianError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub contract_id: String,
    pub verifying_key: String,
    /// RSA encryption key, SPKI PEM
    pub encryption_key: String,
    pub code_hash: String,
    pub registered_at: DateTime<Utc>,
}

pub struct EndpointRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl EndpointRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record or replace the binding for `record.contract_id`
    pub fn register(&self, record: &EndpointRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(&record.contract_id, &bytes)?;
        info!(contract_id = %record.contract_id, "Registered endpoint");
        Ok(())
    }

    pub fn get(&self, contract_id: &str) -> Result<EndpointRecord> {
        let bytes = self
            .store
            .get(contract_id)?
            .ok_or_else(|| GuardianError::UnknownEndpoint(contract_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
