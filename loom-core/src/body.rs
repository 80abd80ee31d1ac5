//! Step bodies
//!
//! A step body is the code a step runs. It receives scalar parameter values
//! and local filesystem paths for its artifacts, and is trusted to read its
//! inputs and write its outputs at those paths.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LoomError, Result};

/// The callable part of a step
pub trait StepBody: Send + Sync {
    /// Runs the step
    ///
    /// Any error is reported by the executor as a step execution failure.
    fn invoke(&self, args: &StepArguments) -> anyhow::Result<()>;
}

impl<F> StepBody for F
where
    F: Fn(&StepArguments) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, args: &StepArguments) -> anyhow::Result<()> {
        self(args)
    }
}

/// Arguments handed to a step body
#[derive(Debug, Clone, PartialEq)]
pub struct StepArguments {
    pub step_name: String,
    pub parameters: BTreeMap<String, JsonValue>,
    /// Local paths of input artifacts
    pub inputs: BTreeMap<String, PathBuf>,
    /// Local paths where output artifacts must be written
    pub outputs: BTreeMap<String, PathBuf>,
    /// Local path of the result file
    pub output_file: PathBuf,
}

impl StepArguments {
    pub fn parameter(&self, name: &str) -> Result<&JsonValue> {
        self.parameters
            .get(name)
            .ok_or_else(|| LoomError::missing_parameter(&self.step_name, name))
    }

    pub fn input_path(&self, name: &str) -> Result<&Path> {
        self.inputs
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| LoomError::missing_parameter(&self.step_name, name))
    }

    pub fn output_path(&self, name: &str) -> Result<&Path> {
        self.outputs
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| LoomError::missing_parameter(&self.step_name, name))
    }

    /// Reads an input artifact
    ///
    /// Fails with `ArtifactNotFound` when nothing was written at the
    /// input's location.
    pub fn read_input(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.input_path(name)?;
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoomError::artifact_not_found(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes an output artifact, creating parent directories
    pub fn write_output(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.output_path(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
