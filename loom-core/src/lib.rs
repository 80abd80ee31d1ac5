//! Loom Core
//!
//! Core types and abstractions for running pipeline steps locally.
//!
//! This crate contains:
//! - Domain types: step declarations, artifact references, executor descriptors
//! - The step body trait and the arguments handed to a step body
//! - Artifact location building and local path translation
//! - The error taxonomy shared by every Loom crate

pub mod body;
pub mod domain;
pub mod error;
pub mod path;

pub use body::{StepArguments, StepBody};
pub use domain::artifact::{ArtifactDirection, ArtifactReference};
pub use domain::descriptor::ExecutorDescriptor;
pub use domain::output::StepOutput;
pub use domain::pipeline::{ArtifactBinding, Pipeline, PipelineParameter, PipelineStep};
pub use domain::step::{ArtifactDeclaration, ParameterDeclaration, ParameterType, StepDeclaration};
pub use error::{LoomError, Result};
pub use path::{LocalMount, path_for};
