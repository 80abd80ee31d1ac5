//! In-process execution
//!
//! Calls a step body directly. Used for local runs and, inside a step
//! container, by the `loom execute` entrypoint.

use loom_core::domain::descriptor::ExecutorOutput;
use loom_core::{ExecutorDescriptor, LocalMount, LoomError, Result, StepArguments, StepBody, StepOutput};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::prepare_output_dirs;

/// Translates every location of a descriptor into a local path
pub fn localize_arguments(descriptor: &ExecutorDescriptor, mount: &LocalMount) -> StepArguments {
    let localize = |references: &BTreeMap<String, loom_core::ArtifactReference>| {
        references
            .iter()
            .map(|(name, reference)| (name.clone(), mount.localize(&reference.uri)))
            .collect::<BTreeMap<String, PathBuf>>()
    };

    StepArguments {
        step_name: descriptor.step_name.clone(),
        parameters: descriptor.parameters.clone(),
        inputs: localize(&descriptor.inputs),
        outputs: localize(&descriptor.outputs),
        output_file: mount.localize(&descriptor.output_file),
    }
}

/// Runs a step body and records its result file
///
/// Output directories are created first. A body error becomes
/// `StepExecution` unless the body itself reported a missing artifact.
pub fn run_in_process(
    body: &dyn StepBody,
    descriptor: &ExecutorDescriptor,
    mount: &LocalMount,
) -> Result<StepOutput> {
    let args = localize_arguments(descriptor, mount);
    prepare_output_dirs(descriptor, mount)?;

    debug!(
        "Invoking '{}' with {} parameter(s), inputs {:?}, outputs {:?}",
        args.step_name,
        args.parameters.len(),
        args.inputs,
        args.outputs
    );

    if let Err(e) = body.invoke(&args) {
        return Err(match e.downcast::<LoomError>() {
            Ok(LoomError::ArtifactNotFound { path }) => LoomError::ArtifactNotFound { path },
            Ok(other) => LoomError::step_execution(&descriptor.step_name, other.to_string()),
            Err(e) => LoomError::step_execution(&descriptor.step_name, format!("{:#}", e)),
        });
    }

    let output = descriptor.step_output();
    write_result_file(&args.output_file, &output)?;
    Ok(output)
}

/// Writes the result file listing the step's output artifacts
pub fn write_result_file(path: &Path, output: &StepOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = serde_json::to_string_pretty(&ExecutorOutput::from(output))?;
    std::fs::write(path, contents)?;
    debug!("Wrote result file {}", path.display());
    Ok(())
}
