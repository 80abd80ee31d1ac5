//! Core Loom modules for Lua step bodies
//!
//! Modules are trait-based so each context can supply its own backend:
//! the runner routes `log` into the run log, the CLI uses no-op sinks when
//! it only needs stubs.

pub mod fs;
pub mod log;

pub use fs::FsModule;
pub use log::{LogModule, LogSink, NoOpLogSink};
