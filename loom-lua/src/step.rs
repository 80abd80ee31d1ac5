//! Lua step bodies

use loom_core::{LoomError, StepArguments, StepBody};
use mlua::{Function, Lua, LuaSerdeExt, Table};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the step whose body is running, stored as Lua app data
///
/// Modules read it to attribute what a body does to its step.
#[derive(Debug, Clone)]
pub struct CurrentStep(pub String);

/// A step body implemented by a Lua function
///
/// The function receives one table:
///
/// ```lua
/// {
///   step = "train",
///   params = { epochs = 500 },
///   inputs = { data = "./gcs/vertex-ai/pipeline_root/create_data/data" },
///   outputs = { model = "./gcs/vertex-ai/pipeline_root/train/model" },
///   output_file = "./gcs/train/execution_output.json",
/// }
/// ```
pub struct LuaStep {
    // Keeps the state alive for as long as the function is referenced
    lua: Lua,
    function: Function,
}

impl LuaStep {
    pub fn new(lua: Lua, function: Function) -> Self {
        Self { lua, function }
    }

    fn arguments_table(&self, args: &StepArguments) -> mlua::Result<Table> {
        let table = self.lua.create_table()?;
        table.set("step", args.step_name.as_str())?;

        let params = self.lua.create_table()?;
        for (name, value) in &args.parameters {
            params.set(name.as_str(), self.lua.to_value(value)?)?;
        }
        table.set("params", params)?;

        table.set("inputs", self.paths_table(&args.inputs)?)?;
        table.set("outputs", self.paths_table(&args.outputs)?)?;
        table.set(
            "output_file",
            args.output_file.to_string_lossy().to_string(),
        )?;

        Ok(table)
    }

    fn paths_table(&self, paths: &BTreeMap<String, PathBuf>) -> mlua::Result<Table> {
        let table = self.lua.create_table()?;
        for (name, path) in paths {
            table.set(name.as_str(), path.to_string_lossy().to_string())?;
        }
        Ok(table)
    }
}

impl StepBody for LuaStep {
    fn invoke(&self, args: &StepArguments) -> anyhow::Result<()> {
        let table = self.arguments_table(args).map_err(|e| {
            anyhow::anyhow!("Failed to build arguments for '{}': {}", args.step_name, e)
        })?;

        self.lua.set_app_data(CurrentStep(args.step_name.clone()));
        let result = self.function.call::<()>(table);
        self.lua.remove_app_data::<CurrentStep>();

        result.map_err(|e| match missing_artifact(&e) {
            Some(path) => LoomError::artifact_not_found(path).into(),
            None => anyhow::anyhow!("{}", e),
        })
    }
}

/// Finds an `ArtifactNotFound` raised by a Rust callback under a Lua error
fn missing_artifact(error: &mlua::Error) -> Option<&Path> {
    match error {
        mlua::Error::CallbackError { cause, .. } => missing_artifact(cause),
        mlua::Error::WithContext { cause, .. } => missing_artifact(cause),
        mlua::Error::ExternalError(inner) => match inner.downcast_ref::<LoomError>() {
            Some(LoomError::ArtifactNotFound { path }) => Some(path.as_path()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::LoomModule;
    use serde_json::json;

    #[test]
    fn test_lua_step_receives_arguments() {
        let lua = Lua::new();
        let function: Function = lua
            .load(
                r#"
                return function(args)
                    assert(args.step == "train")
                    assert(args.params.epochs == 500)
                    assert(args.params.region == "us-east1")
                    assert(args.inputs.data == "/gcs/create_data/data")
                    assert(args.outputs.model == "/gcs/train/model")
                    assert(args.output_file == "/gcs/train/execution_output.json")
                end
            "#,
            )
            .eval()
            .unwrap();

        let mut parameters = BTreeMap::new();
        parameters.insert("epochs".to_string(), json!(500));
        parameters.insert("region".to_string(), json!("us-east1"));
        let mut inputs = BTreeMap::new();
        inputs.insert("data".to_string(), PathBuf::from("/gcs/create_data/data"));
        let mut outputs = BTreeMap::new();
        outputs.insert("model".to_string(), PathBuf::from("/gcs/train/model"));

        let args = StepArguments {
            step_name: "train".to_string(),
            parameters,
            inputs,
            outputs,
            output_file: PathBuf::from("/gcs/train/execution_output.json"),
        };

        LuaStep::new(lua, function).invoke(&args).unwrap();
    }

    #[test]
    fn test_lua_error_is_reported() {
        let lua = Lua::new();
        let function: Function = lua
            .load(r#"return function(args) error("diverged") end"#)
            .eval()
            .unwrap();

        let args = StepArguments {
            step_name: "train".to_string(),
            parameters: BTreeMap::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            output_file: PathBuf::from("out.json"),
        };

        let err = LuaStep::new(lua, function).invoke(&args).unwrap_err();
        assert!(err.to_string().contains("diverged"));
        assert!(err.downcast_ref::<LoomError>().is_none());
    }

    #[test]
    fn test_missing_input_keeps_artifact_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("create_data").join("data");

        let lua = Lua::new();
        crate::modules::FsModule.register(&lua).unwrap();
        let function: Function = lua
            .load(r#"return function(args) return fs.read(args.inputs.data) end"#)
            .eval()
            .unwrap();

        let mut inputs = BTreeMap::new();
        inputs.insert("data".to_string(), missing.clone());
        let args = StepArguments {
            step_name: "train".to_string(),
            parameters: BTreeMap::new(),
            inputs,
            outputs: BTreeMap::new(),
            output_file: PathBuf::from("out.json"),
        };

        let err = LuaStep::new(lua, function).invoke(&args).unwrap_err();
        match err.downcast::<LoomError>().unwrap() {
            LoomError::ArtifactNotFound { path } => assert_eq!(path, missing),
            other => panic!("unexpected error: {}", other),
        }
    }
}
