use serde_json::{json, Value};

use super::{string_param, CapabilityHandler, Parameters};
use crate::types::Result;

/// Returns the `message` parameter
pub struct EchoHandler;

#[async_trait::async_trait]
impl CapabilityHandler for EchoHandler {
    async fn call(&self, parameters: &Parameters) -> Result<Option<Value>> {
        Ok(string_param(parameters, "message").map(|message| json!({ "message": message })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let params = json!({ "message": "hello" }).as_object().cloned().unwrap();
        assert_eq!(
            EchoHandler.call(&params).await.unwrap(),
            Some(json!({ "message": "hello" }))
        );
        assert_eq!(EchoHandler.call(&Parameters::new()).await.unwrap(), None);
    }
}
