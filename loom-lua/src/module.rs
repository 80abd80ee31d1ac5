use mlua::prelude::*;

/// Trait for Loom Lua modules.
///
/// Each module exposes functionality to pipeline files and step bodies
/// running in the sandbox. A module owns one global table named after its
/// identifier.
///
/// # Example
///
/// ```rust
/// use loom_lua::module::LoomModule;
/// use mlua::prelude::*;
///
/// struct ClockModule;
///
/// impl LoomModule for ClockModule {
///     fn id(&self) -> &'static str {
///         "clock"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("epoch", lua.create_function(|_, ()| Ok(0))?)?;
///         lua.globals().set(self.id(), table)?;
///         Ok(())
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\n---@class clock\nclock = {}\n".to_string()
///     }
/// }
/// ```
pub trait LoomModule: Send + Sync {
    /// Global name of the module table.
    ///
    /// Must be a valid Lua identifier and unique across registered modules.
    fn id(&self) -> &'static str;

    /// Registers the module table into the Lua context.
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// Lua Language Server stubs (starting with `---@meta`).
    fn stubs(&self) -> String;

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "0.1.0",
            description: "",
        }
    }
}

/// Metadata about a Loom module
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub id: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Registry of modules loaded into every sandbox
pub struct ModuleRegistry {
    modules: Vec<Box<dyn LoomModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Registers a module
    ///
    /// # Panics
    /// Panics if a module with the same ID is already registered
    pub fn register<M: LoomModule + 'static>(&mut self, module: M) {
        let id = module.id();
        if self.get(id).is_some() {
            panic!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
    }

    pub fn get(&self, id: &str) -> Option<&dyn LoomModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn modules(&self) -> &[Box<dyn LoomModule>] {
        &self.modules
    }

    /// Registers every module into a Lua context, stopping at the first error
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }

    /// Stubs of all modules concatenated into one file
    pub fn generate_stubs(&self) -> String {
        self.modules
            .iter()
            .map(|m| m.stubs())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
