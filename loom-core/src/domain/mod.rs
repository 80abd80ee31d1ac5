//! Core domain types
//!
//! These types describe steps, the artifacts they exchange and the
//! descriptor assembled right before a step runs. They are shared between
//! the Lua definition layer (which builds declarations) and the runner
//! (which resolves and executes them).

pub mod artifact;
pub mod descriptor;
pub mod log;
pub mod output;
pub mod pipeline;
pub mod step;
