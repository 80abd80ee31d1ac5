//! Service layer
//!
//! Services shared by the executor, the driver and Lua step bodies.
//! They are trait-based so tests can substitute their own implementations.

mod log_buffer;

pub use log_buffer::{InMemoryLogBuffer, LogBufferService};
