//! File access for Lua step bodies
//!
//! The sandbox has no `io` library; step bodies read their input artifacts
//! and write their outputs through this module instead.

use crate::module::{LoomModule, ModuleMetadata};
use loom_core::LoomError;
use mlua::prelude::*;
use std::path::Path;
use tracing::debug;

/// The `fs` module
pub struct FsModule;

fn read(path: &str) -> LuaResult<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LuaError::external(LoomError::artifact_not_found(path)))
        }
        Err(e) => Err(LuaError::external(e)),
    }
}

fn write(path: &str, contents: &str) -> LuaResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent).map_err(LuaError::external)?;
    }
    std::fs::write(path, contents).map_err(LuaError::external)?;
    debug!("Wrote {} bytes to {}", contents.len(), path);
    Ok(())
}

impl LoomModule for FsModule {
    fn id(&self) -> &'static str {
        "fs"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let fs_table = lua.create_table()?;

        fs_table.set("read", lua.create_function(|_, path: String| read(&path))?)?;
        fs_table.set(
            "write",
            lua.create_function(|_, (path, contents): (String, String)| write(&path, &contents))?,
        )?;
        fs_table.set(
            "exists",
            lua.create_function(|_, path: String| Ok(Path::new(&path).exists()))?,
        )?;

        lua.globals().set(self.id(), fs_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Artifact file access for Loom step bodies
---@class fs
fs = {}

---Read a whole file; raises an artifact-not-found error when it is missing
---@param path string
---@return string
function fs.read(path) end

---Write a file, creating parent directories
---@param path string
---@param contents string
function fs.write(path, contents) end

---Whether a file or directory exists
---@param path string
---@return boolean
function fs.exists(path) end
"#
        .to_string()
    }

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "1.0.0",
            description: "Artifact file access for step bodies",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua() -> Lua {
        let lua = Lua::new();
        FsModule.register(&lua).unwrap();
        lua
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.csv");
        let lua = lua();
        lua.globals()
            .set("target", path.to_string_lossy().to_string())
            .unwrap();

        let contents: String = lua
            .load(
                r#"
                fs.write(target, "x,y\n1,0\n")
                assert(fs.exists(target))
                return fs.read(target)
            "#,
            )
            .eval()
            .unwrap();

        assert_eq!(contents, "x,y\n1,0\n");
    }

    #[test]
    fn test_read_missing_file_raises_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let lua = lua();
        lua.globals()
            .set("target", dir.path().join("missing").to_string_lossy().to_string())
            .unwrap();

        let err = lua.load("return fs.read(target)").eval::<String>().unwrap_err();
        assert!(err.to_string().contains("Artifact not found"));
    }
}
