//! Step output record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::artifact::ArtifactReference;

/// Outputs recorded after a step runs
///
/// Maps each declared output artifact name to its reference. Owned by the
/// driver and used to wire later steps' inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    pub step_name: String,
    pub artifacts: BTreeMap<String, ArtifactReference>,
}

impl StepOutput {
    pub fn artifact(&self, name: &str) -> Option<&ArtifactReference> {
        self.artifacts.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
