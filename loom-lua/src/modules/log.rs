//! Logging module for Lua step bodies
//!
//! `log.info("...")` and friends forward to a [`LogSink`]. The runner
//! supplies a sink that appends to the run log; stub generation uses a
//! no-op sink.

use crate::module::{LoomModule, ModuleMetadata};
use crate::step::CurrentStep;
use loom_core::domain::log::LogLevel;
use mlua::prelude::*;
use std::sync::{Arc, Mutex};

/// Destination of log lines written by Lua code
///
/// `step` is the step whose body is running, if any.
pub trait LogSink: Send + Sync {
    fn write(&mut self, level: LogLevel, step: Option<&str>, message: &str);
}

/// Sink that discards everything
pub struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn write(&mut self, _level: LogLevel, _step: Option<&str>, _message: &str) {}
}

const LEVELS: [(&str, LogLevel); 4] = [
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warning", LogLevel::Warning),
    ("error", LogLevel::Error),
];

/// The `log` module
pub struct LogModule<S: LogSink> {
    sink: Arc<Mutex<S>>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S: LogSink + 'static> LoomModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in LEVELS {
            let sink = self.sink.clone();
            log_table.set(
                name,
                lua.create_function(move |lua, msg: String| {
                    let current = lua.app_data_ref::<CurrentStep>();
                    sink.lock()
                        .map_err(|e| LuaError::RuntimeError(format!("Failed to lock sink: {}", e)))?
                        .write(level, current.as_ref().map(|c| c.0.as_str()), &msg);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        let mut stubs = String::from("---@meta\n\n---Run log for Loom step bodies\n---@class log\nlog = {}\n");
        for (name, _) in LEVELS {
            stubs.push_str(&format!(
                "\n---Write a {} line to the run log\n---@param msg string\nfunction log.{}(msg) end\n",
                name, name
            ));
        }
        stubs
    }

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "1.0.0",
            description: "Run log access for step bodies",
        }
    }
}
