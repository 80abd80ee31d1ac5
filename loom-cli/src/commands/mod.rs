//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod execute;
mod init;
mod run;

pub use init::InitCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::{RunnerArgs, parse_key_val};

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline, or a single step of it
    Run {
        /// Path to the Lua pipeline file
        pipeline: PathBuf,

        /// Pipeline parameters as key=value pairs (e.g., -p epochs=500)
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Run only this step
        #[arg(short, long)]
        step: Option<String>,

        /// With --step, read inputs from the step's own locations instead
        /// of the outputs of the steps they are bound to
        #[arg(long, requires = "step")]
        isolated: bool,

        #[command(flatten)]
        runner: RunnerArgs,
    },
    /// Print the resolved executor input of a step
    Describe {
        /// Path to the Lua pipeline file
        pipeline: PathBuf,

        /// Step to describe
        #[arg(short, long)]
        step: String,

        /// Pipeline parameters as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Resolve inputs to the step's own locations
        #[arg(long)]
        isolated: bool,

        #[command(flatten)]
        runner: RunnerArgs,
    },
    /// Execute one step from its executor input (used inside step containers)
    Execute {
        /// Path to the Lua pipeline file
        #[arg(long)]
        pipeline: PathBuf,

        /// Serialized executor input
        #[arg(long)]
        executor_input: String,

        /// Name of the step to execute
        #[arg(long)]
        function_to_execute: String,
    },
    /// Initialize development environment
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            pipeline,
            param,
            step,
            isolated,
            runner,
        } => run::run_pipeline(&pipeline, &param, step.as_deref(), isolated, runner).await,
        Commands::Describe {
            pipeline,
            step,
            param,
            isolated,
            runner,
        } => run::describe_step(&pipeline, &step, &param, isolated, runner),
        Commands::Execute {
            pipeline,
            executor_input,
            function_to_execute,
        } => execute::execute_step(&pipeline, &executor_input, &function_to_execute),
        Commands::Init { command } => init::handle_init_command(command).await,
    }
}
