//! LogSink implementation for the runner
//!
//! Connects the Lua `log` module to the run's log buffer so that lines
//! written by step bodies end up in the run report.

use loom_core::domain::log::{LogEntry, LogLevel};
use loom_lua::LogSink;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::service::LogBufferService;

/// Buffered log sink that writes to a LogBufferService
pub struct BufferedLogSink {
    buffer: Arc<dyn LogBufferService>,
}

impl BufferedLogSink {
    pub fn new(buffer: Arc<dyn LogBufferService>) -> Self {
        Self { buffer }
    }
}

impl LogSink for BufferedLogSink {
    fn write(&mut self, level: LogLevel, step: Option<&str>, message: &str) {
        let step_name = step.unwrap_or("-");
        match level {
            LogLevel::Debug => debug!(target: "loom::lua", step = step_name, "{}", message),
            LogLevel::Info => info!(target: "loom::lua", step = step_name, "{}", message),
            LogLevel::Warning => warn!(target: "loom::lua", step = step_name, "{}", message),
            LogLevel::Error => error!(target: "loom::lua", step = step_name, "{}", message),
        }

        self.buffer.add_entry(LogEntry::new(level, step, message));
    }
}
