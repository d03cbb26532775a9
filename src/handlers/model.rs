use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{error, info, warn};

use super::{string_param, CapabilityHandler, Parameters};
use crate::types::{GuardianError, Result};

/// Invokes a hosted inference endpoint on behalf of a token holder.
///
/// Parameters: `hf_auth_token`, `hf_endpoint_url`, `payload_type` (only
/// `json`), and the JSON-encoded `user_inputs`, `user_inputs_schema` and
/// `fixed_model_params`. User inputs must satisfy the schema and override
/// fixed parameters of the same name.
pub struct UseModelHandler {
    client: reqwest::Client,
}

impl UseModelHandler {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardianError::Config(format!("model client: {e}")))?;
        Ok(Self { client })
    }

    fn build_payload(parameters: &Parameters) -> Option<Map<String, Value>> {
        let payload_type = string_param(parameters, "payload_type")?;
        if payload_type != "json" {
            warn!(payload_type, "Unsupported payload type");
            return None;
        }

        let user_inputs = decode_object(string_param(parameters, "user_inputs")?)?;
        let schema = decode_object(string_param(parameters, "user_inputs_schema")?)?;
        let fixed = decode_object(string_param(parameters, "fixed_model_params")?)?;

        if let Err(reason) = check_schema(&Value::Object(user_inputs.clone()), &Value::Object(schema), "user_inputs") {
            warn!(reason = %reason, "Invalid user inputs");
            return None;
        }

        let mut payload = fixed;
        payload.extend(user_inputs);
        Some(payload)
    }
}

fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => {
            warn!("Expected a JSON object parameter");
            None
        }
    }
}

/// Checks `value` against the JSON Schema keywords `type`, `properties`,
/// `required`, `additionalProperties` (boolean form) and `items`. Other
/// keywords are ignored.
fn check_schema(value: &Value, schema: &Value, at: &str) -> std::result::Result<(), String> {
    let Value::Object(schema) = schema else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| has_type(value, t)) {
            return Err(format!("{at} is not of type {}", allowed.join("|")));
        }
    }

    if let Value::Object(fields) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(key) {
                    return Err(format!("{at} is missing {key}"));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        for (key, field) in fields {
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => check_schema(field, field_schema, &format!("{at}.{key}"))?,
                None if schema.get("additionalProperties") == Some(&Value::Bool(false)) => {
                    return Err(format!("{at} does not allow {key}"));
                }
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check_schema(item, item_schema, &format!("{at}[{i}]"))?;
        }
    }

    Ok(())
}

fn has_type(value: &Value, name: &str) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

#[async_trait::async_trait]
impl CapabilityHandler for UseModelHandler {
    fn unique_requests(&self) -> bool {
        true
    }

    async fn call(&self, parameters: &Parameters) -> Result<Option<Value>> {
        let (Some(auth_token), Some(endpoint_url)) = (
            string_param(parameters, "hf_auth_token"),
            string_param(parameters, "hf_endpoint_url"),
        ) else {
            return Ok(None);
        };
        let Some(payload) = Self::build_payload(parameters) else {
            return Ok(None);
        };

        info!(endpoint = endpoint_url, "Querying model endpoint");

        let response = match self
            .client
            .post(endpoint_url)
            .bearer_auth(auth_token)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Model request failed");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            error!(status = %response.status(), "Model endpoint returned an error");
            return Ok(None);
        }

        match response.json::<Value>().await {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!(error = %e, "Model response was not JSON");
                Ok(None)
            }
        }
    }
}
