//! Lua pipeline loading for the runner
//!
//! Pipeline files are loaded with the `log` module routed into the run's
//! log buffer and the `fs` module for artifact access.

mod sinks;

pub use sinks::BufferedLogSink;

use anyhow::Result;
use loom_core::Pipeline;
use loom_lua::{FsModule, LogModule, ModuleRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::service::LogBufferService;

/// Creates the module registry used by step bodies
pub fn runner_registry(log_buffer: Arc<dyn LogBufferService>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(LogModule::new(BufferedLogSink::new(log_buffer)));
    registry.register(FsModule);
    registry
}

/// Loads a Lua pipeline file whose step bodies log into `log_buffer`
pub fn load_pipeline_file(path: &Path, log_buffer: Arc<dyn LogBufferService>) -> Result<Pipeline> {
    let registry = runner_registry(log_buffer);
    let pipeline = loom_lua::load_pipeline_file(path, &registry)?;

    info!(
        "Loaded pipeline '{}' with {} step(s) from {}",
        pipeline.name,
        pipeline.steps.len(),
        path.display()
    );

    Ok(pipeline)
}
