//! Lua sandbox creation
//!
//! Pipeline files and step bodies run in a restricted Lua state: no `io`,
//! `os`, `package` or `debug` libraries and no way to load external code.
//! File access goes through the `fs` module registered by the caller.
//!
//! The `pipeline` helper module is always injected since pipeline files use
//! it to build their definition tables.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table};

use crate::module::ModuleRegistry;

/// Create a restricted Lua sandbox with the given modules registered
///
/// # Example
/// ```no_run
/// use loom_lua::module::ModuleRegistry;
/// use loom_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox(&ModuleRegistry::new())?;
/// let definition: mlua::Table = lua
///     .load(r#"return pipeline.define({ name = "demo", steps = {} })"#)
///     .eval()?;
/// let name: String = definition.get("name")?;
/// assert_eq!(name, "demo");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox(registry: &ModuleRegistry) -> LuaResult<Lua> {
    // Only TABLE, STRING, MATH, COROUTINE; IO, OS, PACKAGE, DEBUG stay out
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_pipeline_module(&lua)?;
    registry.register_all(&lua)?;

    Ok(lua)
}

/// Lua Language Server stubs for the `pipeline` helper module
pub const PIPELINE_STUBS: &str = r#"---@meta

---@class StepArgs
---@field step string
---@field params table<string, any>
---@field inputs table<string, string> Local paths of input artifacts
---@field outputs table<string, string> Local paths where outputs must be written
---@field output_file string

---@class StepDefinition
---@field name string
---@field parameters? table<string, string>
---@field inputs? table<string, string|table>
---@field outputs? table<string, string>
---@field image? string
---@field command? string[]
---@field cpu_limit? string|number
---@field run fun(args: StepArgs)

---@class PipelineDefinition
---@field name string
---@field description? string
---@field parameters? table<string, {type: string, default?: any, description?: string}>
---@field steps StepDefinition[]

---Pipeline definition helpers
---@class pipeline
pipeline = {}

---Declare the pipeline; returns the table unchanged
---@param definition PipelineDefinition
---@return PipelineDefinition
function pipeline.define(definition) end

---Declare a step; returns the table unchanged
---@param step StepDefinition
---@return StepDefinition
function pipeline.step(step) end

---Declare an input artifact, optionally bound to "step.output"
---@param schema string
---@param from? string
---@return table
function pipeline.input(schema, from) end
"#;

/// Register the `pipeline` helper module
///
/// `pipeline.define` and `pipeline.step` return their table unchanged;
/// `pipeline.input(schema, from)` builds a wired input entry.
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    pipeline.set(
        "define",
        lua.create_function(|_, definition: Table| Ok(definition))?,
    )?;

    pipeline.set("step", lua.create_function(|_, step: Table| Ok(step))?)?;

    pipeline.set(
        "input",
        lua.create_function(|lua, (schema, from): (String, Option<String>)| {
            let input = lua.create_table()?;
            input.set("type", schema)?;
            if let Some(from) = from {
                input.set("from", from)?;
            }
            Ok(input)
        })?,
    )?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{FsModule, LogModule, NoOpLogSink};

    fn sandbox() -> Lua {
        create_sandbox(&ModuleRegistry::new()).unwrap()
    }

    #[test]
    fn test_sandbox_basic_lua() {
        let lua = sandbox();

        let sum: i32 = lua
            .load("local t = {a = 1, b = 2} return t.a + t.b")
            .eval()
            .unwrap();
        assert_eq!(sum, 3);

        let upper: String = lua.load(r#"return string.upper("loom")"#).eval().unwrap();
        assert_eq!(upper, "LOOM");
    }

    #[test]
    fn test_sandbox_has_no_io_or_os() {
        let lua = sandbox();

        let has_io: bool = lua.load("return io ~= nil").eval().unwrap();
        assert!(!has_io);

        let has_os: bool = lua.load("return os ~= nil").eval().unwrap();
        assert!(!has_os);

        let result: LuaResult<()> = lua.load(r#"require("os")"#).exec();
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_registers_modules() {
        let lua = sandbox();
        let has_log: bool = lua.load("return log ~= nil").eval().unwrap();
        assert!(!has_log);

        let mut registry = ModuleRegistry::new();
        registry.register(LogModule::new(NoOpLogSink));
        registry.register(FsModule);
        let lua = create_sandbox(&registry).unwrap();

        let ready: bool = lua
            .load("return log ~= nil and fs ~= nil")
            .eval()
            .unwrap();
        assert!(ready);
    }

    #[test]
    fn test_pipeline_stubs_cover_helpers() {
        assert!(PIPELINE_STUBS.starts_with("---@meta"));
        for helper in ["define", "step", "input"] {
            assert!(PIPELINE_STUBS.contains(&format!("function pipeline.{}(", helper)));
        }
    }

    #[test]
    fn test_pipeline_helpers() {
        let lua = sandbox();

        let (schema, from): (String, String) = lua
            .load(
                r#"
                local input = pipeline.input("system.Dataset", "create_data.data")
                return input.type, input.from
            "#,
            )
            .eval()
            .unwrap();
        assert_eq!(schema, "system.Dataset");
        assert_eq!(from, "create_data.data");

        let name: String = lua
            .load(r#"return pipeline.define({ name = "demo" }).name"#)
            .eval()
            .unwrap();
        assert_eq!(name, "demo");
    }
}
