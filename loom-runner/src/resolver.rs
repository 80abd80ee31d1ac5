//! Parameter and artifact resolution
//!
//! Turns a step declaration plus the values available at run time into the
//! [`ExecutorDescriptor`] the step is invoked with.

use loom_core::path::{path_for, result_file_location, root_overlaps_result_files};
use loom_core::{
    ArtifactBinding, ArtifactReference, ExecutorDescriptor, LoomError, Result, StepDeclaration,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::RunnerConfig;

/// Values supplied by the caller for one step invocation
#[derive(Debug, Clone, Default)]
pub struct ProvidedValues {
    /// Scalar parameter values by name
    pub parameters: BTreeMap<String, JsonValue>,
    /// Already-resolved input artifacts by input name
    pub artifacts: BTreeMap<String, ArtifactReference>,
}

impl ProvidedValues {
    pub fn new(parameters: BTreeMap<String, JsonValue>) -> Self {
        Self {
            parameters,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn with_artifact(mut self, input: impl Into<String>, reference: ArtifactReference) -> Self {
        self.artifacts.insert(input.into(), reference);
        self
    }
}

/// Redirects of input artifacts to outputs of other steps
#[derive(Debug, Clone, Default)]
pub struct ArtifactMapping {
    redirects: BTreeMap<String, ArtifactBinding>,
}

impl ArtifactMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from input bindings
    pub fn from_bindings(bindings: &BTreeMap<String, ArtifactBinding>) -> Self {
        Self {
            redirects: bindings.clone(),
        }
    }

    pub fn insert(&mut self, input: impl Into<String>, binding: ArtifactBinding) {
        self.redirects.insert(input.into(), binding);
    }

    pub fn get(&self, input: &str) -> Option<&ArtifactBinding> {
        self.redirects.get(input)
    }

    pub fn is_empty(&self) -> bool {
        self.redirects.is_empty()
    }
}

/// Builds executor descriptors for a fixed pipeline root
#[derive(Debug, Clone)]
pub struct Resolver {
    pipeline_root: String,
    symbolic_prefix: String,
}

impl Resolver {
    pub fn new(pipeline_root: impl Into<String>, symbolic_prefix: impl Into<String>) -> Self {
        Self {
            pipeline_root: pipeline_root.into(),
            symbolic_prefix: symbolic_prefix.into(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(&config.pipeline_root, &config.symbolic_prefix)
    }

    pub fn pipeline_root(&self) -> &str {
        &self.pipeline_root
    }

    /// Resolves every declared parameter and artifact of a step
    ///
    /// Scalars are checked first; no artifact location is built until all
    /// of them are present and well-typed. Inputs resolve from a supplied
    /// reference, then a mapping redirect, then the step's own location.
    pub fn resolve(
        &self,
        step: &StepDeclaration,
        provided: &ProvidedValues,
        mapping: &ArtifactMapping,
    ) -> Result<ExecutorDescriptor> {
        if root_overlaps_result_files(&self.pipeline_root, &self.symbolic_prefix) {
            return Err(LoomError::InvalidDescriptor(format!(
                "pipeline root '{}' is the symbolic root itself; step artifacts would share directories with result files",
                self.pipeline_root
            )));
        }

        let mut parameters = BTreeMap::new();
        for declared in &step.parameters {
            let value = provided
                .parameters
                .get(&declared.name)
                .ok_or_else(|| LoomError::missing_parameter(&step.name, &declared.name))?;

            if !declared.parameter_type.accepts(value) {
                return Err(LoomError::InvalidParameter {
                    step: step.name.clone(),
                    name: declared.name.clone(),
                    expected: declared.parameter_type.to_string(),
                    value: value.to_string(),
                });
            }

            parameters.insert(declared.name.clone(), value.clone());
        }

        let outputs = step
            .outputs()
            .map(|output| {
                let reference = ArtifactReference::new(
                    &output.name,
                    &step.name,
                    &output.schema_title,
                    path_for(&self.pipeline_root, &step.name, &output.name),
                );
                (output.name.clone(), reference)
            })
            .collect();

        let mut inputs = BTreeMap::new();
        for input in step.inputs() {
            let reference = if let Some(reference) = provided.artifacts.get(&input.name) {
                reference.clone()
            } else if let Some(binding) = mapping.get(&input.name) {
                ArtifactReference::new(
                    &binding.artifact,
                    &binding.step,
                    &input.schema_title,
                    path_for(&self.pipeline_root, &binding.step, &binding.artifact),
                )
            } else {
                ArtifactReference::new(
                    &input.name,
                    &step.name,
                    &input.schema_title,
                    path_for(&self.pipeline_root, &step.name, &input.name),
                )
            };

            debug!("Input '{}' of '{}' -> {}", input.name, step.name, reference.uri);
            inputs.insert(input.name.clone(), reference);
        }

        Ok(ExecutorDescriptor {
            step_name: step.name.clone(),
            parameters,
            inputs,
            outputs,
            output_file: result_file_location(&self.symbolic_prefix, &step.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::ParameterType;
    use loom_core::domain::artifact::schema;
    use serde_json::json;

    fn resolver() -> Resolver {
        Resolver::new("gs://root", "gs://")
    }

    fn train() -> StepDeclaration {
        StepDeclaration::new("train")
            .parameter("epochs", ParameterType::Int)
            .parameter("region", ParameterType::String)
            .input("data", schema::DATASET)
            .output("model", schema::MODEL)
    }

    fn params() -> BTreeMap<String, JsonValue> {
        let mut parameters = BTreeMap::new();
        parameters.insert("epochs".to_string(), json!(500));
        parameters.insert("region".to_string(), json!("us-east1"));
        parameters
    }

    #[test]
    fn test_outputs_use_canonical_locations() {
        let d = resolver()
            .resolve(&train(), &ProvidedValues::new(params()), &ArtifactMapping::new())
            .unwrap();

        assert_eq!(d.outputs["model"].uri, "gs://root/train/model");
        assert_eq!(d.outputs["model"].schema_title, schema::MODEL);
        assert_eq!(d.output_file, "gs://train/execution_output.json");
        assert_eq!(d.parameters["epochs"], json!(500));
    }

    #[test]
    fn test_input_defaults_to_own_location() {
        let d = resolver()
            .resolve(&train(), &ProvidedValues::new(params()), &ArtifactMapping::new())
            .unwrap();

        assert_eq!(d.inputs["data"].uri, "gs://root/train/data");
        assert_eq!(d.inputs["data"].step_name, "train");
    }

    #[test]
    fn test_input_follows_mapping() {
        let mut mapping = ArtifactMapping::new();
        mapping.insert("data", ArtifactBinding::new("create_data", "dataset"));

        let d = resolver()
            .resolve(&train(), &ProvidedValues::new(params()), &mapping)
            .unwrap();

        assert_eq!(d.inputs["data"].uri, "gs://root/create_data/dataset");
        assert_eq!(d.inputs["data"].step_name, "create_data");
        assert_eq!(d.inputs["data"].schema_title, schema::DATASET);
    }

    #[test]
    fn test_provided_reference_wins_over_mapping() {
        let supplied = ArtifactReference::new("data", "elsewhere", schema::DATASET, "gs://other/data");
        let provided = ProvidedValues::new(params()).with_artifact("data", supplied.clone());
        let mut mapping = ArtifactMapping::new();
        mapping.insert("data", ArtifactBinding::new("create_data", "data"));

        let d = resolver().resolve(&train(), &provided, &mapping).unwrap();
        assert_eq!(d.inputs["data"], supplied);
    }

    #[test]
    fn test_missing_parameter() {
        let mut parameters = params();
        parameters.remove("region");

        let err = resolver()
            .resolve(&train(), &ProvidedValues::new(parameters), &ArtifactMapping::new())
            .unwrap_err();

        assert!(err.is_missing_parameter());
        assert!(err.to_string().contains("region"));
        assert!(err.to_string().contains("train"));
    }

    #[test]
    fn test_wrong_parameter_type() {
        let mut parameters = params();
        parameters.insert("epochs".to_string(), json!("many"));

        let err = resolver()
            .resolve(&train(), &ProvidedValues::new(parameters), &ArtifactMapping::new())
            .unwrap_err();

        assert!(matches!(err, LoomError::InvalidParameter { ref name, .. } if name == "epochs"));
    }

    #[test]
    fn test_extra_values_are_ignored() {
        let mut parameters = params();
        parameters.insert("google_project_id".to_string(), json!("proj"));

        let d = resolver()
            .resolve(&train(), &ProvidedValues::new(parameters), &ArtifactMapping::new())
            .unwrap();
        assert!(!d.parameters.contains_key("google_project_id"));
    }

    #[test]
    fn test_step_without_declarations() {
        let d = resolver()
            .resolve(
                &StepDeclaration::new("noop"),
                &ProvidedValues::default(),
                &ArtifactMapping::new(),
            )
            .unwrap();

        assert!(d.parameters.is_empty());
        assert!(d.inputs.is_empty());
        assert!(d.outputs.is_empty());
        assert_eq!(d.output_file, "gs://noop/execution_output.json");
    }

    #[test]
    fn test_root_equal_to_prefix_is_rejected() {
        let err = Resolver::new("gs://", "gs://")
            .resolve(
                &StepDeclaration::new("report"),
                &ProvidedValues::default(),
                &ArtifactMapping::new(),
            )
            .unwrap_err();

        assert!(matches!(err, LoomError::InvalidDescriptor(_)));
    }
}
