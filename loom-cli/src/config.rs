//! CLI configuration
//!
//! Runner settings come from `LOOM_*` environment variables first; the
//! flags below override them for a single invocation.

use anyhow::{Context, Result};
use clap::Args;
use loom_runner::{ExecutionMode, RunnerConfig};
use std::path::{Path, PathBuf};

/// Where pipeline files are mounted inside step containers
const PIPELINE_MOUNT: &str = "/pipeline";

/// Runner flags shared by `run` and `describe`
#[derive(Args, Debug, Clone, Default)]
pub struct RunnerArgs {
    /// Execution mode: in-process or container
    #[arg(long)]
    pub mode: Option<ExecutionMode>,

    /// Local directory standing in for the symbolic prefix
    #[arg(long)]
    pub local_dir: Option<PathBuf>,

    /// Root under which artifact locations are built
    #[arg(long)]
    pub pipeline_root: Option<String>,

    /// Container runtime binary (podman, docker)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Image for steps that do not declare one
    #[arg(long)]
    pub image: Option<String>,

    /// Fail containerized steps whose outputs are missing
    #[arg(long)]
    pub verify_outputs: bool,
}

impl RunnerArgs {
    /// Builds the runner configuration for a pipeline file
    ///
    /// In container mode the pipeline file's directory is mounted into each
    /// step container and passed to `loom execute`.
    pub fn into_config(self, pipeline_file: &Path) -> Result<RunnerConfig> {
        let mut config =
            RunnerConfig::from_env().context("Failed to read LOOM_* environment variables")?;

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(local_dir) = self.local_dir {
            config.local_dir = local_dir;
        }
        if let Some(root) = self.pipeline_root {
            config.pipeline_root = root;
        }
        if let Some(runtime) = self.runtime {
            config.container.runtime = runtime;
        }
        if let Some(image) = self.image {
            config.container.default_image = image;
        }
        if self.verify_outputs {
            config.verify_outputs = true;
        }

        if config.mode == ExecutionMode::Container {
            let absolute = std::fs::canonicalize(pipeline_file).with_context(|| {
                format!("Failed to resolve pipeline file {}", pipeline_file.display())
            })?;
            let (dir, file) = match (absolute.parent(), absolute.file_name()) {
                (Some(dir), Some(file)) => (dir.to_path_buf(), file.to_string_lossy().to_string()),
                _ => anyhow::bail!("Invalid pipeline file path {}", absolute.display()),
            };

            config.container = config
                .container
                .with_volume(dir, PIPELINE_MOUNT)
                .with_command_args(["--pipeline".to_string(), format!("{}/{}", PIPELINE_MOUNT, file)]);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a single key=value pair
pub fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
