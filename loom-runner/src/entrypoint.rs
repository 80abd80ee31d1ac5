//! Container-side step entrypoint
//!
//! A step container runs `loom execute --executor-input <json>
//! --function-to-execute <step>`. This module turns those two arguments
//! back into a descriptor and runs the named step body in-process, with
//! locations translated against the container mount.

use loom_core::{ExecutorDescriptor, LocalMount, LoomError, Pipeline, Result, StepOutput};
use tracing::info;

use crate::executor::run_in_process;

/// Runs one step of a pipeline from its serialized executor input
///
/// # Arguments
/// * `pipeline` - Pipeline holding the step body
/// * `step_name` - Value of `--function-to-execute`
/// * `executor_input` - Value of `--executor-input`
/// * `mount` - Translation of symbolic locations inside the container
pub fn execute_step(
    pipeline: &Pipeline,
    step_name: &str,
    executor_input: &str,
    mount: &LocalMount,
) -> Result<StepOutput> {
    let step = pipeline.step(step_name).ok_or_else(|| {
        LoomError::InvalidPipeline(format!(
            "pipeline '{}' has no step named '{}'",
            pipeline.name, step_name
        ))
    })?;

    let descriptor = ExecutorDescriptor::from_json(step_name, executor_input)?;

    // The host resolved this step already; anything missing here means the
    // descriptor was built for a different declaration
    for declared in &step.declaration.parameters {
        if !descriptor.parameters.contains_key(&declared.name) {
            return Err(LoomError::missing_parameter(step_name, &declared.name));
        }
    }
    for output in step.declaration.outputs() {
        if !descriptor.outputs.contains_key(&output.name) {
            return Err(LoomError::InvalidDescriptor(format!(
                "no location for output '{}' of step '{}'",
                output.name, step_name
            )));
        }
    }

    info!(
        "Executing step '{}' with artifacts under {}",
        step_name,
        mount.local_dir().display()
    );

    run_in_process(step.body.as_ref(), &descriptor, mount)
}
