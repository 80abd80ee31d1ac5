//! Execute command handler
//!
//! Entry point of step containers: the host passes the serialized executor
//! input and the step name, and the artifact directory is mounted where
//! `LOOM_LOCAL_DIR` points.

use anyhow::{Context, Result};
use loom_runner::{InMemoryLogBuffer, RunnerConfig, execute_step as run_step, load_pipeline_file};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Execute a single step from its executor input
pub fn execute_step(pipeline_file: &Path, executor_input: &str, step_name: &str) -> Result<()> {
    let config = RunnerConfig::from_env().context("Failed to read LOOM_* environment variables")?;
    let mount = config.local_mount();

    let pipeline = load_pipeline_file(pipeline_file, Arc::new(InMemoryLogBuffer::new()))?;

    let output = run_step(&pipeline, step_name, executor_input, &mount)
        .with_context(|| format!("Failed to execute step '{}'", step_name))?;

    info!(
        "Step '{}' completed with {} output artifact(s)",
        step_name,
        output.artifacts.len()
    );

    Ok(())
}
