//! Step execution
//!
//! A step is executed either in-process (the body is called directly) or in
//! a container (the body is called by `loom execute` inside the container).
//! Both paths translate symbolic locations with a [`LocalMount`] and create
//! the step's output directory before the body runs.

pub mod container;
pub mod in_process;

use async_trait::async_trait;
use loom_core::domain::log::LogLevel;
use loom_core::{ExecutorDescriptor, LocalMount, LoomError, PipelineStep, Result, StepOutput};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{ExecutionMode, RunnerConfig};
use crate::service::LogBufferService;

pub use container::{ContainerStepRunner, check_runtime_available};
pub use in_process::{localize_arguments, run_in_process, write_result_file};

/// Executes one resolved step
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Runs the step body against the descriptor
    ///
    /// # Returns
    /// The step's output record; every declared output is expected to
    /// exist at its location once this returns
    async fn execute(
        &self,
        step: &PipelineStep,
        descriptor: &ExecutorDescriptor,
        mode: ExecutionMode,
    ) -> Result<StepOutput>;
}

/// Standard implementation of StepExecutor
pub struct StandardStepExecutor {
    config: RunnerConfig,
    run_id: Uuid,
    log_buffer: Arc<dyn LogBufferService>,
}

impl StandardStepExecutor {
    pub fn new(config: RunnerConfig, log_buffer: Arc<dyn LogBufferService>) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
            log_buffer,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    async fn execute_in_process(
        &self,
        step: &PipelineStep,
        descriptor: &ExecutorDescriptor,
    ) -> Result<StepOutput> {
        let body = step.body.clone();
        let descriptor = descriptor.clone();
        let mount = self.config.local_mount();
        let step_name = descriptor.step_name.clone();

        // Step bodies block; keep them off the async worker threads
        tokio::task::spawn_blocking(move || run_in_process(body.as_ref(), &descriptor, &mount))
            .await
            .map_err(|e| LoomError::step_execution(step_name, format!("step body panicked: {}", e)))?
    }
}

#[async_trait]
impl StepExecutor for StandardStepExecutor {
    async fn execute(
        &self,
        step: &PipelineStep,
        descriptor: &ExecutorDescriptor,
        mode: ExecutionMode,
    ) -> Result<StepOutput> {
        let name = descriptor.step_name.as_str();
        info!("Executing step '{}' ({})", name, mode);
        self.log_buffer
            .log(LogLevel::Info, Some(name), &format!("Starting step: {}", name));

        let result = match mode {
            ExecutionMode::InProcess => self.execute_in_process(step, descriptor).await,
            ExecutionMode::Container => {
                ContainerStepRunner::new(&self.config, self.run_id)
                    .run(&step.declaration, descriptor, self.log_buffer.as_ref())
                    .await
            }
        };

        match &result {
            Ok(output) => {
                debug!(
                    "Step '{}' produced {} artifact(s)",
                    name,
                    output.artifacts.len()
                );
                self.log_buffer
                    .log(LogLevel::Info, Some(name), &format!("Completed step: {}", name));
            }
            Err(e) => {
                error!("Step '{}' failed: {}", name, e);
                self.log_buffer.log(LogLevel::Error, Some(name), &e.to_string());
            }
        }

        result
    }
}

/// Creates the directory of every declared output artifact
///
/// Does nothing for a step without outputs.
pub fn prepare_output_dirs(descriptor: &ExecutorDescriptor, mount: &LocalMount) -> Result<()> {
    for output in descriptor.outputs.values() {
        let path = mount.localize(&output.uri);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ArtifactMapping, ProvidedValues, Resolver};
    use crate::service::InMemoryLogBuffer;
    use loom_core::domain::artifact::schema;
    use loom_core::{StepArguments, StepDeclaration};
    use tempfile::tempdir;

    fn executor(dir: &std::path::Path) -> (StandardStepExecutor, InMemoryLogBuffer) {
        let buffer = InMemoryLogBuffer::new();
        let config = RunnerConfig::new("gs://root", dir);
        (StandardStepExecutor::new(config, Arc::new(buffer.clone())), buffer)
    }

    fn descriptor(declaration: &StepDeclaration) -> ExecutorDescriptor {
        Resolver::new("gs://root", "gs://")
            .resolve(declaration, &ProvidedValues::default(), &ArtifactMapping::new())
            .unwrap()
    }

    #[test]
    fn test_prepare_output_dirs_without_outputs() {
        let dir = tempdir().unwrap();
        let mount = LocalMount::new("gs://", dir.path());
        let d = descriptor(&StepDeclaration::new("noop").input("data", schema::DATASET));

        prepare_output_dirs(&d, &mount).unwrap();
        assert!(!dir.path().join("root").exists());
    }

    #[test]
    fn test_prepare_output_dirs_with_outputs() {
        let dir = tempdir().unwrap();
        let mount = LocalMount::new("gs://", dir.path());
        let d = descriptor(&StepDeclaration::new("make").output("data", schema::DATASET));

        prepare_output_dirs(&d, &mount).unwrap();
        assert!(dir.path().join("root").join("make").is_dir());
        assert!(!dir.path().join("root").join("make").join("data").exists());
    }

    #[tokio::test]
    async fn test_execute_in_process_logs_lifecycle() {
        let dir = tempdir().unwrap();
        let (executor, buffer) = executor(dir.path());

        let declaration = StepDeclaration::new("make").output("data", schema::DATASET);
        let step = PipelineStep::new(
            declaration.clone(),
            Arc::new(|args: &StepArguments| -> anyhow::Result<()> {
                args.write_output("data", "x,y\n")?;
                Ok(())
            }),
        );

        let output = executor
            .execute(&step, &descriptor(&declaration), ExecutionMode::InProcess)
            .await
            .unwrap();

        assert_eq!(output.artifact("data").unwrap().uri, "gs://root/make/data");
        let messages: Vec<String> = buffer.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["Starting step: make", "Completed step: make"]);
    }

    #[tokio::test]
    async fn test_execute_in_process_failure_is_logged() {
        let dir = tempdir().unwrap();
        let (executor, buffer) = executor(dir.path());

        let declaration = StepDeclaration::new("broken");
        let step = PipelineStep::new(
            declaration.clone(),
            Arc::new(|_: &StepArguments| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("division by zero"))
            }),
        );

        let err = executor
            .execute(&step, &descriptor(&declaration), ExecutionMode::InProcess)
            .await
            .unwrap_err();

        assert!(err.is_step_execution());
        let entries = buffer.drain();
        assert_eq!(entries.last().unwrap().level, LogLevel::Error);
        assert!(entries.last().unwrap().message.contains("division by zero"));
    }
}
