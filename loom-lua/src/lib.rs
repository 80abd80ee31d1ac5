//! Loom Lua Pipelines
//!
//! Pipelines can be written as Lua files. This crate provides:
//! - Module trait and registry for Lua modules
//! - A restricted sandbox in which pipeline files and step bodies run
//! - Core module implementations (`log`, `fs`)
//! - Loading of pipeline files into [`loom_core::Pipeline`] values whose
//!   step bodies call back into Lua

pub mod definition;
pub mod module;
pub mod modules;
pub mod sandbox;
pub mod step;

pub use definition::{load_pipeline, load_pipeline_file};
pub use module::{LoomModule, ModuleMetadata, ModuleRegistry};
pub use modules::{FsModule, LogModule, LogSink};
pub use sandbox::{PIPELINE_STUBS, create_sandbox};
pub use step::LuaStep;
