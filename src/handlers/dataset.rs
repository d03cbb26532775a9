use serde_json::Value;
use tracing::info;

use super::{string_param, CapabilityHandler, Parameters};
use crate::types::Result;

/// Runs an experiment against a dataset held by the guardian.
///
/// The experiment runner is not wired in; the handler reports the run it
/// would perform.
pub struct UseDatasetHandler;

#[async_trait::async_trait]
impl CapabilityHandler for UseDatasetHandler {
    fn unique_requests(&self) -> bool {
        true
    }

    async fn call(&self, parameters: &Parameters) -> Result<Option<Value>> {
        let (Some(dataset_id), Some(experiment_id), Some(model_ids)) = (
            string_param(parameters, "dataset_id"),
            string_param(parameters, "experiment_id"),
            string_param(parameters, "associated_model_ids"),
        ) else {
            return Ok(None);
        };

        info!(dataset_id, experiment_id, "Running dataset experiment");

        let summary = format!(
            "Experiment completed.\nDataset ID: {dataset_id}\nExperiment ID: {experiment_id}\nAssociated Model IDs: {model_ids}"
        );
        Ok(Some(Value::String(summary)))
    }
}
