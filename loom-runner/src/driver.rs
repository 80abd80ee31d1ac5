//! Pipeline driver
//!
//! Runs the steps of a pipeline strictly in declaration order. Each step's
//! inputs are chained to the recorded outputs of earlier steps through its
//! bindings. The first failure aborts the run; nothing already written is
//! rolled back.

use loom_core::domain::log::{LogEntry, LogLevel};
use loom_core::{ExecutorDescriptor, LoomError, Pipeline, PipelineStep, Result, StepOutput};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{ExecutionMode, RunnerConfig};
use crate::executor::{StandardStepExecutor, StepExecutor, check_runtime_available};
use crate::resolver::{ArtifactMapping, ProvidedValues, Resolver};
use crate::service::LogBufferService;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    /// Step outputs in execution order
    pub outputs: Vec<StepOutput>,
    /// Run log collected while the steps executed
    pub logs: Vec<LogEntry>,
}

impl RunReport {
    pub fn output(&self, step_name: &str) -> Option<&StepOutput> {
        self.outputs.iter().find(|o| o.step_name == step_name)
    }
}

/// Runs pipelines against one configuration
pub struct PipelineDriver {
    config: RunnerConfig,
    resolver: Resolver,
    executor: Arc<dyn StepExecutor>,
    log_buffer: Arc<dyn LogBufferService>,
}

impl PipelineDriver {
    pub fn new(
        config: RunnerConfig,
        executor: Arc<dyn StepExecutor>,
        log_buffer: Arc<dyn LogBufferService>,
    ) -> Self {
        Self {
            resolver: Resolver::from_config(&config),
            config,
            executor,
            log_buffer,
        }
    }

    /// Creates a driver backed by the standard executor
    pub fn standard(config: RunnerConfig, log_buffer: Arc<dyn LogBufferService>) -> Self {
        let executor = Arc::new(StandardStepExecutor::new(config.clone(), log_buffer.clone()));
        Self::new(config, executor, log_buffer)
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs every step of the pipeline
    ///
    /// # Arguments
    /// * `pipeline` - The pipeline to run; validated before any step starts
    /// * `parameters` - Pipeline parameter values shared by all steps
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        parameters: &BTreeMap<String, JsonValue>,
    ) -> Result<RunReport> {
        pipeline.validate()?;
        self.check_mode()?;

        let run_id = Uuid::new_v4();
        let total = pipeline.steps.len();
        info!(
            "Starting run {} of pipeline '{}' ({} step(s), {})",
            run_id, pipeline.name, total, self.config.mode
        );
        self.log_buffer.log(
            LogLevel::Info,
            None,
            &format!("Starting pipeline: {}", pipeline.name),
        );

        let provided = ProvidedValues::new(parameters.clone());
        let mut recorded: BTreeMap<String, StepOutput> = BTreeMap::new();
        let mut outputs = Vec::with_capacity(total);

        for (index, step) in pipeline.steps.iter().enumerate() {
            info!("Step {}/{}: {}", index + 1, total, step.name());

            let result = match chained_mapping(step, &recorded) {
                Ok(mapping) => self.execute_step(step, &provided, &mapping).await,
                Err(e) => Err(e),
            };

            let output = result.inspect_err(|e| {
                error!("Pipeline '{}' aborted at step '{}': {}", pipeline.name, step.name(), e);
                self.log_buffer.log(
                    LogLevel::Error,
                    None,
                    &format!("Pipeline aborted at step: {}", step.name()),
                );
            })?;

            recorded.insert(step.name().to_string(), output.clone());
            outputs.push(output);
        }

        info!("Pipeline '{}' completed", pipeline.name);
        self.log_buffer.log(
            LogLevel::Info,
            None,
            &format!("Pipeline completed: {}", pipeline.name),
        );

        Ok(RunReport {
            run_id,
            pipeline: pipeline.name.clone(),
            outputs,
            logs: self.log_buffer.drain(),
        })
    }

    /// Runs a single step on its own
    ///
    /// With `isolated` set, inputs resolve to the step's own locations;
    /// otherwise bound inputs point at where the producing steps write, so
    /// a previous full run can be reused.
    pub async fn run_step(
        &self,
        pipeline: &Pipeline,
        step_name: &str,
        parameters: &BTreeMap<String, JsonValue>,
        isolated: bool,
    ) -> Result<RunReport> {
        pipeline.validate()?;
        self.check_mode()?;

        let step = find_step(pipeline, step_name)?;
        info!("Running step '{}' of pipeline '{}'", step_name, pipeline.name);

        let mapping = standalone_mapping(step, isolated);
        let output = self
            .execute_step(step, &ProvidedValues::new(parameters.clone()), &mapping)
            .await?;

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.name.clone(),
            outputs: vec![output],
            logs: self.log_buffer.drain(),
        })
    }

    /// Resolves a step without running it
    pub fn describe(
        &self,
        pipeline: &Pipeline,
        step_name: &str,
        parameters: &BTreeMap<String, JsonValue>,
        isolated: bool,
    ) -> Result<ExecutorDescriptor> {
        pipeline.validate()?;
        let step = find_step(pipeline, step_name)?;
        self.resolver.resolve(
            &step.declaration,
            &ProvidedValues::new(parameters.clone()),
            &standalone_mapping(step, isolated),
        )
    }

    async fn execute_step(
        &self,
        step: &PipelineStep,
        provided: &ProvidedValues,
        mapping: &ArtifactMapping,
    ) -> Result<StepOutput> {
        let descriptor = self.resolver.resolve(&step.declaration, provided, mapping)?;
        debug!("Executor input for '{}': {}", step.name(), descriptor.to_json()?);

        self.executor
            .execute(step, &descriptor, self.config.mode)
            .await
    }

    fn check_mode(&self) -> Result<()> {
        if self.config.mode == ExecutionMode::Container {
            check_runtime_available(&self.config.container.runtime)?;
        }
        Ok(())
    }
}

fn find_step<'a>(pipeline: &'a Pipeline, step_name: &str) -> Result<&'a PipelineStep> {
    pipeline.step(step_name).ok_or_else(|| {
        LoomError::InvalidPipeline(format!(
            "pipeline '{}' has no step named '{}'",
            pipeline.name, step_name
        ))
    })
}

/// Mapping for a step inside a run: every binding must name an output
/// that an earlier step has already produced
fn chained_mapping(
    step: &PipelineStep,
    recorded: &BTreeMap<String, StepOutput>,
) -> Result<ArtifactMapping> {
    let mut mapping = ArtifactMapping::new();

    for (input, binding) in &step.bindings {
        let produced = recorded
            .get(&binding.step)
            .and_then(|output| output.artifact(&binding.artifact));

        if produced.is_none() {
            return Err(LoomError::InvalidPipeline(format!(
                "input '{}' of step '{}' is bound to '{}' which has not been produced",
                input,
                step.name(),
                binding
            )));
        }

        mapping.insert(input.clone(), binding.clone());
    }

    Ok(mapping)
}

fn standalone_mapping(step: &PipelineStep, isolated: bool) -> ArtifactMapping {
    if isolated {
        ArtifactMapping::new()
    } else {
        ArtifactMapping::from_bindings(&step.bindings)
    }
}
