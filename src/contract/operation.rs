//! Typed contract operations.
//!
//! Each family's operation set is a table composed from the shared base
//! operations plus the family's own entries, where a family entry with the
//! same name replaces the base one.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::platform::{ContractPlatform, InvocationRequest};
use crate::types::{GuardianError, Result};

/// One contract method as seen by the command layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    /// Name commands and the CLI use
    pub name: &'static str,
    /// Method name sent to the contract
    pub method: &'static str,
    /// Keyword parameters that must be present
    pub required: &'static [&'static str],
    /// Whether the invocation changes contract state and must be committed
    pub commit: bool,
}

impl OperationSpec {
    pub const fn new(
        name: &'static str,
        method: &'static str,
        required: &'static [&'static str],
        commit: bool,
    ) -> Self {
        Self {
            name,
            method,
            required,
            commit,
        }
    }

    /// Committed operation whose method name matches its name
    pub const fn update(name: &'static str, required: &'static [&'static str]) -> Self {
        Self::new(name, name, required, true)
    }

    /// Read-only operation whose method name matches its name
    pub const fn query(name: &'static str, required: &'static [&'static str]) -> Self {
        Self::new(name, name, required, false)
    }

    /// Build the invocation, rejecting missing required parameters
    pub fn request(&self, parameters: Map<String, Value>) -> Result<InvocationRequest> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|key| !parameters.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(GuardianError::Validation(format!(
                "{} requires {}",
                self.name,
                missing.join(", ")
            )));
        }
        Ok(InvocationRequest::keyword(self.method, parameters))
    }
}

/// Operations shared by every contract
pub const BASE_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::query("get_verifying_key", &[]),
    OperationSpec::query("get_contract_metadata", &[]),
    OperationSpec::query("get_contract_code_metadata", &[]),
    OperationSpec::query("get_ledger_key", &[]),
];

#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    entries: BTreeMap<&'static str, OperationSpec>,
}

impl OperationTable {
    pub fn base() -> Self {
        Self::default().with(BASE_OPERATIONS)
    }

    /// Add entries, replacing any existing entry of the same name
    pub fn with(mut self, entries: &[OperationSpec]) -> Self {
        for spec in entries {
            self.entries.insert(spec.name, *spec);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validate and send one named operation to the contract in `save_file`
pub async fn invoke_operation(
    platform: &dyn ContractPlatform,
    table: &OperationTable,
    save_file: &str,
    name: &str,
    parameters: Map<String, Value>,
) -> Result<Value> {
    let spec = table
        .get(name)
        .ok_or_else(|| GuardianError::UnknownOperation(name.to_string()))?;
    let request = spec.request(parameters)?;

    debug!(save_file, operation = name, method = spec.method, commit = spec.commit, "Invoking contract operation");
    platform.invoke(save_file, &request, spec.commit).await
}

/// Shorthand for building keyword parameters
#[macro_export]
macro_rules! params {
    () => { ::serde_json::Map::new() };
    ($($key:literal => $value:expr),+ $(,)?) => {{
        let mut map = ::serde_json::Map::new();
        $( map.insert($key.to_string(), ::serde_json::json!($value)); )+
        map
    }};
}
