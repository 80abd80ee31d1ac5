//! Loom Runner
//!
//! Runs pipeline steps on the local machine, either inside the current
//! process or inside a container per step.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Resolver: turns a step declaration plus supplied values into an
//!   executor descriptor
//! - Executor: invokes one step body in-process or in a container
//! - Driver: runs every step of a pipeline in order, chaining artifacts
//! - Services: log buffering shared by the executor and Lua step bodies
//! - Lua: loading pipeline files with the runner's module backends
//! - Entrypoint: the container side of a containerized step

pub mod config;
pub mod driver;
pub mod entrypoint;
pub mod executor;
pub mod lua;
pub mod resolver;
pub mod service;

pub use config::{ContainerConfig, ExecutionMode, RunnerConfig};
pub use driver::{PipelineDriver, RunReport};
pub use entrypoint::execute_step;
pub use executor::{StandardStepExecutor, StepExecutor};
pub use lua::{BufferedLogSink, load_pipeline_file};
pub use resolver::{ArtifactMapping, ProvidedValues, Resolver};
pub use service::{InMemoryLogBuffer, LogBufferService};
