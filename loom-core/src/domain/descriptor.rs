//! Executor descriptor
//!
//! The descriptor is assembled immediately before a step runs and discarded
//! afterwards. Its serialized form (the "executor input") is what a
//! containerized step receives on its command line:
//!
//! ```json
//! {
//!   "inputs":  { "parameterValues": { "epochs": 500 },
//!                "artifacts": { "data": { "artifacts": [ ... ] } } },
//!   "outputs": { "artifacts": { "model": { "artifacts": [ ... ] } },
//!                "outputFile": "gs://train/execution_output.json" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::domain::artifact::{ArtifactReference, RuntimeArtifactList};
use crate::domain::output::StepOutput;
use crate::error::{LoomError, Result};

/// Resolved inputs and outputs of one step invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorDescriptor {
    pub step_name: String,
    pub parameters: BTreeMap<String, JsonValue>,
    pub inputs: BTreeMap<String, ArtifactReference>,
    pub outputs: BTreeMap<String, ArtifactReference>,
    /// Location of the result file
    pub output_file: String,
}

impl ExecutorDescriptor {
    /// Converts to the serializable executor input
    pub fn to_executor_input(&self) -> ExecutorInput {
        ExecutorInput {
            inputs: ExecutorInputs {
                parameter_values: self.parameters.clone(),
                artifacts: to_artifact_lists(&self.inputs),
            },
            outputs: ExecutorOutputs {
                artifacts: to_artifact_lists(&self.outputs),
                output_file: self.output_file.clone(),
            },
        }
    }

    /// Rebuilds a descriptor from an executor input
    pub fn from_executor_input(step_name: &str, input: ExecutorInput) -> Result<Self> {
        Ok(Self {
            step_name: step_name.to_string(),
            parameters: input.inputs.parameter_values,
            inputs: from_artifact_lists(step_name, input.inputs.artifacts)?,
            outputs: from_artifact_lists(step_name, input.outputs.artifacts)?,
            output_file: input.outputs.output_file,
        })
    }

    /// Serializes the descriptor as executor input JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_executor_input())?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_executor_input())?)
    }

    /// Parses executor input JSON for the given step
    pub fn from_json(step_name: &str, json: &str) -> Result<Self> {
        let input: ExecutorInput = serde_json::from_str(json)?;
        Self::from_executor_input(step_name, input)
    }

    /// The output record produced when this invocation succeeds
    pub fn step_output(&self) -> StepOutput {
        StepOutput {
            step_name: self.step_name.clone(),
            artifacts: self.outputs.clone(),
        }
    }
}

fn to_artifact_lists(
    references: &BTreeMap<String, ArtifactReference>,
) -> BTreeMap<String, RuntimeArtifactList> {
    references
        .iter()
        .map(|(name, reference)| (name.clone(), RuntimeArtifactList::from(reference)))
        .collect()
}

fn from_artifact_lists(
    step_name: &str,
    lists: BTreeMap<String, RuntimeArtifactList>,
) -> Result<BTreeMap<String, ArtifactReference>> {
    let mut references = BTreeMap::new();
    for (name, list) in lists {
        let runtime = list.artifacts.first().ok_or_else(|| {
            LoomError::InvalidDescriptor(format!("artifact slot '{}' is empty", name))
        })?;
        references.insert(name, ArtifactReference::from_runtime(runtime, step_name));
    }
    Ok(references)
}

/// Serialized executor input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInput {
    pub inputs: ExecutorInputs,
    pub outputs: ExecutorOutputs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorInputs {
    #[serde(default)]
    pub parameter_values: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, RuntimeArtifactList>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOutputs {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, RuntimeArtifactList>,
    pub output_file: String,
}

/// Contents of the result file written after a step completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    #[serde(default)]
    pub artifacts: BTreeMap<String, RuntimeArtifactList>,
}

impl From<&StepOutput> for ExecutorOutput {
    fn from(output: &StepOutput) -> Self {
        Self {
            artifacts: to_artifact_lists(&output.artifacts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::schema;
    use serde_json::json;

    fn descriptor() -> ExecutorDescriptor {
        let mut parameters = BTreeMap::new();
        parameters.insert("epochs".to_string(), json!(500));

        let mut inputs = BTreeMap::new();
        inputs.insert(
            "data".to_string(),
            ArtifactReference::new("data", "create_data", schema::DATASET, "gs://root/create_data/data"),
        );

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "model".to_string(),
            ArtifactReference::new("model", "train", schema::MODEL, "gs://root/train/model"),
        );

        ExecutorDescriptor {
            step_name: "train".to_string(),
            parameters,
            inputs,
            outputs,
            output_file: "gs://train/execution_output.json".to_string(),
        }
    }

    #[test]
    fn test_executor_input_layout() {
        let value = serde_json::to_value(descriptor().to_executor_input()).unwrap();

        assert_eq!(value["inputs"]["parameterValues"]["epochs"], json!(500));
        assert_eq!(
            value["inputs"]["artifacts"]["data"]["artifacts"][0]["uri"],
            json!("gs://root/create_data/data")
        );
        assert_eq!(
            value["outputs"]["artifacts"]["model"]["artifacts"][0]["type"]["schemaTitle"],
            json!("system.Model")
        );
        assert_eq!(
            value["outputs"]["outputFile"],
            json!("gs://train/execution_output.json")
        );
    }

    #[test]
    fn test_empty_artifact_sections_are_omitted() {
        let mut d = descriptor();
        d.inputs.clear();
        d.outputs.clear();

        let value = serde_json::to_value(d.to_executor_input()).unwrap();
        assert!(value["inputs"].get("artifacts").is_none());
        assert!(value["outputs"].get("artifacts").is_none());
        assert!(value["outputs"].get("outputFile").is_some());
    }

    #[test]
    fn test_parse_executor_input_from_other_tools() {
        let json = r#"{
            "inputs": { "parameterValues": { "epochs": 500, "google_region": "us-east1" } },
            "outputs": {
                "artifacts": { "model": { "artifacts": [ {
                    "name": "my-model",
                    "metadata": {},
                    "type": { "schemaTitle": "system.Model" },
                    "uri": "gs://vertex-ai/pipeline_root/model.bin"
                } ] } },
                "outputFile": "./gcs/out.json"
            }
        }"#;

        let d = ExecutorDescriptor::from_json("train", json).unwrap();
        assert_eq!(d.parameters["epochs"], json!(500));
        assert!(d.inputs.is_empty());
        assert_eq!(d.outputs["model"].name, "my-model");
        assert_eq!(d.outputs["model"].step_name, "train");
        assert_eq!(d.output_file, "./gcs/out.json");
    }

    #[test]
    fn test_empty_artifact_slot_is_rejected() {
        let json = r#"{
            "inputs": { "parameterValues": {} },
            "outputs": { "artifacts": { "model": { "artifacts": [] } }, "outputFile": "x" }
        }"#;

        let err = ExecutorDescriptor::from_json("train", json).unwrap_err();
        assert!(matches!(err, LoomError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_descriptor_survives_serialization() {
        let d = descriptor();
        let restored = ExecutorDescriptor::from_json("train", &d.to_json().unwrap()).unwrap();
        assert_eq!(restored, d);
    }
}
