//! Artifact domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Well-known schema titles
pub mod schema {
    pub const ARTIFACT: &str = "system.Artifact";
    pub const DATASET: &str = "system.Dataset";
    pub const MODEL: &str = "system.Model";
    pub const METRICS: &str = "system.Metrics";
}

/// Metadata key recording the step that owns an artifact
const STEP_METADATA_KEY: &str = "step";

/// Whether a step reads or writes an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactDirection {
    Input,
    Output,
}

/// A produced or consumed artifact
///
/// Created when a step declares an output; read by any later step that
/// references it. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub name: String,
    /// Step that owns (writes) the artifact
    pub step_name: String,
    pub schema_title: String,
    /// Resolved symbolic location
    pub uri: String,
}

impl ArtifactReference {
    pub fn new(
        name: impl Into<String>,
        step_name: impl Into<String>,
        schema_title: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            step_name: step_name.into(),
            schema_title: schema_title.into(),
            uri: uri.into(),
        }
    }

    /// Converts to the wire representation used in executor descriptors
    pub fn to_runtime(&self) -> RuntimeArtifact {
        let mut metadata = Map::new();
        metadata.insert(
            STEP_METADATA_KEY.to_string(),
            JsonValue::String(self.step_name.clone()),
        );

        RuntimeArtifact {
            name: self.name.clone(),
            metadata,
            artifact_type: RuntimeArtifactType {
                schema_title: self.schema_title.clone(),
            },
            uri: self.uri.clone(),
        }
    }

    /// Converts from the wire representation
    ///
    /// Artifacts written by other tools carry no owning step; `default_step`
    /// is used for those.
    pub fn from_runtime(runtime: &RuntimeArtifact, default_step: &str) -> Self {
        let step_name = runtime
            .metadata
            .get(STEP_METADATA_KEY)
            .and_then(JsonValue::as_str)
            .unwrap_or(default_step);

        Self::new(
            runtime.name.clone(),
            step_name,
            runtime.artifact_type.schema_title.clone(),
            runtime.uri.clone(),
        )
    }
}

/// Runtime artifact as it appears in descriptors and result files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeArtifact {
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    #[serde(rename = "type")]
    pub artifact_type: RuntimeArtifactType,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeArtifactType {
    #[serde(rename = "schemaTitle")]
    pub schema_title: String,
}

/// List wrapper used for every named artifact slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeArtifactList {
    pub artifacts: Vec<RuntimeArtifact>,
}

impl From<&ArtifactReference> for RuntimeArtifactList {
    fn from(reference: &ArtifactReference) -> Self {
        Self {
            artifacts: vec![reference.to_runtime()],
        }
    }
}
