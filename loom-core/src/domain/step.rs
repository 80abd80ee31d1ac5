//! Step declaration types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::domain::artifact::ArtifactDirection;
use crate::error::{LoomError, Result};

/// Scalar parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Int,
    Float,
    Bool,
}

impl ParameterType {
    /// Parses a type name as written in pipeline definitions
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" | "string" => Some(Self::String),
            "int" | "integer" => Some(Self::Int),
            "float" | "number" => Some(Self::Float),
            "bool" | "boolean" => Some(Self::Bool),
            _ => None,
        }
    }

    /// Whether a JSON value is acceptable for this type
    ///
    /// Integers are accepted where a float is declared.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
        }
    }

    /// Converts a raw command-line string into a JSON value of this type
    pub fn coerce(&self, raw: &str) -> Option<JsonValue> {
        match self {
            Self::String => Some(JsonValue::String(raw.to_string())),
            Self::Int => raw.parse::<i64>().ok().map(JsonValue::from),
            Self::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number),
            Self::Bool => raw.parse::<bool>().ok().map(JsonValue::Bool),
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterType::String => write!(f, "string"),
            ParameterType::Int => write!(f, "int"),
            ParameterType::Float => write!(f, "float"),
            ParameterType::Bool => write!(f, "bool"),
        }
    }
}

/// A declared scalar parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
}

/// A declared input or output artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDeclaration {
    pub name: String,
    pub direction: ArtifactDirection,
    /// Type tag, e.g. `system.Dataset`
    pub schema_title: String,
}

/// Declaration of a pipeline step
///
/// Built once when the pipeline is defined and never changed afterwards.
/// Parameters and artifacts are enumerated explicitly; nothing is inferred
/// from the step body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDeclaration {
    pub name: String,
    pub parameters: Vec<ParameterDeclaration>,
    pub artifacts: Vec<ArtifactDeclaration>,

    /// Container image used in container mode
    pub image: Option<String>,

    /// Entry command inside the container; the runner default is used when empty
    pub command: Vec<String>,

    /// CPU limit passed to the container runtime (e.g. "2")
    pub cpu_limit: Option<String>,
}

impl StepDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            artifacts: Vec::new(),
            image: None,
            command: Vec::new(),
            cpu_limit: None,
        }
    }

    /// Declares a scalar parameter
    pub fn parameter(mut self, name: impl Into<String>, parameter_type: ParameterType) -> Self {
        self.parameters.push(ParameterDeclaration {
            name: name.into(),
            parameter_type,
        });
        self
    }

    /// Declares an input artifact
    pub fn input(mut self, name: impl Into<String>, schema_title: impl Into<String>) -> Self {
        self.artifacts.push(ArtifactDeclaration {
            name: name.into(),
            direction: ArtifactDirection::Input,
            schema_title: schema_title.into(),
        });
        self
    }

    /// Declares an output artifact
    pub fn output(mut self, name: impl Into<String>, schema_title: impl Into<String>) -> Self {
        self.artifacts.push(ArtifactDeclaration {
            name: name.into(),
            direction: ArtifactDirection::Output,
            schema_title: schema_title.into(),
        });
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_cpu_limit(mut self, cpu_limit: impl Into<String>) -> Self {
        self.cpu_limit = Some(cpu_limit.into());
        self
    }

    /// Declared input artifacts in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = &ArtifactDeclaration> {
        self.artifacts
            .iter()
            .filter(|a| a.direction == ArtifactDirection::Input)
    }

    /// Declared output artifacts in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &ArtifactDeclaration> {
        self.artifacts
            .iter()
            .filter(|a| a.direction == ArtifactDirection::Output)
    }

    pub fn has_outputs(&self) -> bool {
        self.outputs().next().is_some()
    }

    pub fn input_named(&self, name: &str) -> Option<&ArtifactDeclaration> {
        self.inputs().find(|a| a.name == name)
    }

    pub fn output_named(&self, name: &str) -> Option<&ArtifactDeclaration> {
        self.outputs().find(|a| a.name == name)
    }

    /// Checks the declaration is usable
    ///
    /// The name must be non-empty and usable as a path segment, and every
    /// parameter and artifact name must be unique within the step.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LoomError::InvalidPipeline(
                "step name cannot be empty".to_string(),
            ));
        }
        if self.name.contains('/') {
            return Err(LoomError::InvalidPipeline(format!(
                "step name '{}' cannot be used as a path segment",
                self.name
            )));
        }
        // `step.artifact` bindings split on the first dot
        if self.name.contains('.') {
            return Err(LoomError::InvalidPipeline(format!(
                "step name '{}' cannot contain '.'",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        let names = self
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.artifacts.iter().map(|a| a.name.as_str()));
        for name in names {
            if name.is_empty() || name.contains('/') {
                return Err(LoomError::InvalidPipeline(format!(
                    "step '{}' declares an invalid name '{}'",
                    self.name, name
                )));
            }
            if !seen.insert(name) {
                return Err(LoomError::InvalidPipeline(format!(
                    "step '{}' declares '{}' more than once",
                    self.name, name
                )));
            }
        }

        Ok(())
    }
}
