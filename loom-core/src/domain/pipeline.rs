//! Pipeline domain types
//!
//! A pipeline is an ordered list of steps. Each step carries its
//! declaration, its body, and bindings that wire its input artifacts to
//! outputs of earlier steps.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::body::StepBody;
use crate::domain::step::{ParameterType, StepDeclaration};
use crate::error::{LoomError, Result};

/// A pipeline-level parameter with an optional default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    pub default: Option<JsonValue>,
    pub description: Option<String>,
}

/// Wires an input artifact to the output of another step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactBinding {
    pub step: String,
    pub artifact: String,
}

impl ArtifactBinding {
    pub fn new(step: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            artifact: artifact.into(),
        }
    }

    /// Parses the `step.artifact` form
    ///
    /// The first dot separates the step from the artifact; step names
    /// cannot contain one.
    pub fn parse(reference: &str) -> Option<Self> {
        let (step, artifact) = reference.split_once('.')?;
        if step.is_empty() || artifact.is_empty() {
            return None;
        }
        Some(Self::new(step, artifact))
    }
}

impl std::fmt::Display for ArtifactBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.step, self.artifact)
    }
}

/// A step as it appears in a pipeline
#[derive(Clone)]
pub struct PipelineStep {
    pub declaration: StepDeclaration,
    /// Input artifact name -> producing step output
    pub bindings: BTreeMap<String, ArtifactBinding>,
    pub body: Arc<dyn StepBody>,
}

impl PipelineStep {
    pub fn new(declaration: StepDeclaration, body: Arc<dyn StepBody>) -> Self {
        Self {
            declaration,
            bindings: BTreeMap::new(),
            body,
        }
    }

    /// Binds an input artifact to an output of an earlier step
    pub fn bind(mut self, input: impl Into<String>, binding: ArtifactBinding) -> Self {
        self.bindings.insert(input.into(), binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }
}

impl std::fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStep")
            .field("declaration", &self.declaration)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// An ordered, sequentially executed list of steps
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<PipelineParameter>,
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, parameter: PipelineParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Checks structural consistency
    ///
    /// - at least one step, every declaration valid
    /// - step names unique
    /// - every binding targets a declared input and an output declared by an
    ///   earlier step
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(LoomError::InvalidPipeline(format!(
                "pipeline '{}' must have at least one step",
                self.name
            )));
        }

        let mut earlier: HashMap<&str, &StepDeclaration> = HashMap::new();
        for step in &self.steps {
            step.declaration.validate()?;

            for (input, binding) in &step.bindings {
                if step.declaration.input_named(input).is_none() {
                    return Err(LoomError::InvalidPipeline(format!(
                        "step '{}' binds '{}' which is not a declared input",
                        step.name(),
                        input
                    )));
                }

                let producer = earlier.get(binding.step.as_str()).ok_or_else(|| {
                    LoomError::InvalidPipeline(format!(
                        "step '{}' reads '{}' but step '{}' does not run before it",
                        step.name(),
                        binding,
                        binding.step
                    ))
                })?;

                if producer.output_named(&binding.artifact).is_none() {
                    return Err(LoomError::InvalidPipeline(format!(
                        "step '{}' reads '{}' but step '{}' declares no such output",
                        step.name(),
                        binding,
                        binding.step
                    )));
                }
            }

            if earlier.insert(step.name(), &step.declaration).is_some() {
                return Err(LoomError::InvalidPipeline(format!(
                    "step name '{}' is used more than once",
                    step.name()
                )));
            }
        }

        Ok(())
    }

    /// Builds the parameter values for a run
    ///
    /// Declared defaults are applied first, then `key=value` overrides.
    /// Overrides of declared parameters are converted to the declared type;
    /// undeclared ones are inferred (int, float, bool, else string).
    pub fn parameter_values(
        &self,
        overrides: &[(String, String)],
    ) -> Result<BTreeMap<String, JsonValue>> {
        let mut values: BTreeMap<String, JsonValue> = self
            .parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();

        for (key, raw) in overrides {
            let value = match self.parameters.iter().find(|p| &p.name == key) {
                Some(parameter) => parameter.parameter_type.coerce(raw).ok_or_else(|| {
                    LoomError::InvalidParameter {
                        step: self.name.clone(),
                        name: key.clone(),
                        expected: parameter.parameter_type.to_string(),
                        value: raw.clone(),
                    }
                })?,
                None => infer_value(raw),
            };
            values.insert(key.clone(), value);
        }

        Ok(values)
    }
}

fn infer_value(raw: &str) -> JsonValue {
    [ParameterType::Int, ParameterType::Float, ParameterType::Bool]
        .iter()
        .find_map(|t| t.coerce(raw))
        .unwrap_or_else(|| JsonValue::String(raw.to_string()))
}
