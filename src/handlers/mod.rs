//! Capability handlers.
//!
//! A handler receives the decrypted `parameters` of a capability operation.
//! `Ok(None)` means the operation failed in a way the caller should see as
//! an unprocessable request; `Err` is an unexpected failure.

mod dataset;
mod echo;
mod model;

pub use dataset::UseDatasetHandler;
pub use echo::EchoHandler;
pub use model::UseModelHandler;

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::types::Result;

/// Capability parameters
pub type Parameters = Map<String, Value>;

#[async_trait::async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Operations that must not be replayed require a request identifier
    fn unique_requests(&self) -> bool {
        false
    }

    async fn call(&self, parameters: &Parameters) -> Result<Option<Value>>;
}

/// Method name to handler dispatch table
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers served by a stock guardian
    pub fn standard(timeout: Duration) -> crate::types::Result<Self> {
        let mut map = Self::new();
        map.register("echo", EchoHandler);
        map.register("use_dataset", UseDatasetHandler);
        map.register("use_hfmodel", UseModelHandler::new(timeout)?);
        Ok(map)
    }

    pub fn register<H: CapabilityHandler + 'static>(&mut self, method_name: &str, handler: H) {
        self.handlers.insert(method_name.to_string(), Arc::new(handler));
    }

    pub fn get(&self, method_name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(method_name).cloned()
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Required string parameter; `None` when missing or not a string
pub(crate) fn string_param<'a>(parameters: &'a Parameters, name: &str) -> Option<&'a str> {
    match parameters.get(name) {
        Some(Value::String(s)) => Some(s.as_str()),
        _ => {
            tracing::debug!(parameter = name, "Missing or non-string parameter");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_map() {
        let map = HandlerMap::standard(Duration::from_secs(1)).unwrap();
        assert_eq!(map.method_names(), vec!["echo", "use_dataset", "use_hfmodel"]);
        assert!(!map.get("echo").unwrap().unique_requests());
        assert!(map.get("use_dataset").unwrap().unique_requests());
        assert!(map.get("use_hfmodel").unwrap().unique_requests());
        assert!(map.get("nope").is_none());
    }
}
