//! Init command handlers
//!
//! Generates Lua editor support for writing pipeline files: stub files for
//! the sandbox modules and a .luarc.json pointing the language server at
//! them.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use loom_lua::module::LoomModule;
use loom_lua::modules::{FsModule, LogModule, NoOpLogSink};
use std::fs;
use std::path::Path;

/// Directory (relative to the output directory) holding generated stubs
const STUBS_DIR: &str = ".loom/stubs";

/// Init subcommands
#[derive(Subcommand)]
pub enum InitCommands {
    /// Generate Lua development files (.luarc.json and stubs)
    Lua {
        /// Output directory for generated files
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Generate only .luarc.json
        #[arg(long, conflicts_with = "stubs_only")]
        config_only: bool,

        /// Generate only stub files
        #[arg(long)]
        stubs_only: bool,
    },
}

/// Handle init commands
pub async fn handle_init_command(command: InitCommands) -> Result<()> {
    match command {
        InitCommands::Lua {
            output,
            config_only,
            stubs_only,
        } => generate_lua_dev_files(Path::new(&output), config_only, stubs_only),
    }
}

/// Generate Lua development files
fn generate_lua_dev_files(output_path: &Path, config_only: bool, stubs_only: bool) -> Result<()> {
    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create output directory {:?}", output_path))?;

    if !stubs_only {
        generate_luarc_json(output_path)?;
    }

    if !config_only {
        generate_stub_files(output_path)?;
    }

    println!("{}", "✓ Lua development files generated!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Install Lua Language Server in your editor");
    println!("  2. Write a pipeline file returning pipeline.define({{ ... }})");
    println!("  3. Use {} to run it", "loom run <pipeline.lua>".cyan());

    Ok(())
}

/// Generate .luarc.json for Lua LSP configuration
fn generate_luarc_json(output_path: &Path) -> Result<()> {
    let luarc_path = output_path.join(".luarc.json");

    let luarc = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
        "runtime": { "version": "Lua 5.4" },
        "diagnostics": { "globals": ["pipeline", "log", "fs"] },
        "workspace": { "library": [STUBS_DIR], "checkThirdParty": false },
        "completion": { "callSnippet": "Both" }
    });

    fs::write(&luarc_path, serde_json::to_string_pretty(&luarc)? + "\n")
        .with_context(|| format!("Failed to write .luarc.json to {:?}", luarc_path))?;

    println!("  {} .luarc.json", "Created".green());

    Ok(())
}

/// Generate stub files for the sandbox modules
///
/// Stubs come from the module implementations themselves so they stay in
/// sync with what step bodies can call.
fn generate_stub_files(output_path: &Path) -> Result<()> {
    let stubs_dir = output_path.join(STUBS_DIR);
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    let modules: Vec<Box<dyn LoomModule>> =
        vec![Box::new(LogModule::new(NoOpLogSink)), Box::new(FsModule)];

    let mut stubs: Vec<(&str, String)> = vec![("pipeline", loom_lua::PIPELINE_STUBS.to_string())];
    stubs.extend(modules.iter().map(|m| (m.id(), m.stubs())));

    for (name, content) in stubs {
        let stub_path = stubs_dir.join(format!("{}.lua", name));
        fs::write(&stub_path, content)
            .with_context(|| format!("Failed to write stub file {:?}", stub_path))?;

        println!("  {} {}.lua", "Created".green(), name);
    }

    println!(
        "  {} in {}",
        "Stubs ready".green(),
        stubs_dir.display().to_string().cyan()
    );

    Ok(())
}
