//! Runner configuration
//!
//! Defines where artifacts live, how symbolic locations map onto the local
//! filesystem, and how containerized steps are launched.

use loom_core::LocalMount;
use loom_core::path::{DEFAULT_PIPELINE_ROOT, DEFAULT_SYMBOLIC_PREFIX, root_overlaps_result_files};
use std::path::PathBuf;
use std::str::FromStr;

/// Where a step body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Call the step body directly in this process
    #[default]
    InProcess,
    /// Launch one container per step
    Container,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-process" | "inprocess" | "local" => Ok(Self::InProcess),
            "container" => Ok(Self::Container),
            other => Err(format!(
                "unknown execution mode '{}' (expected 'in-process' or 'container')",
                other
            )),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Container => write!(f, "container"),
        }
    }
}

/// Container launch settings
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Container runtime binary (podman, docker)
    pub runtime: String,

    /// Where the local artifact directory is mounted inside the container
    pub mount_point: String,

    /// Image used by steps that do not declare their own
    pub default_image: String,

    /// Command used by steps that do not declare their own; the executor
    /// appends `--executor-input <json> --function-to-execute <step>`
    pub command: Vec<String>,

    /// Additional bind mounts as (host path, container path)
    pub volumes: Vec<(PathBuf, String)>,

    /// Extra environment variables passed to every container
    pub env: Vec<(String, String)>,
}

impl ContainerConfig {
    /// Adds a bind mount
    pub fn with_volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    /// Appends arguments to the default command
    pub fn with_command_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "podman".to_string(),
            mount_point: "/gcs".to_string(),
            default_image: "localhost/loom:latest".to_string(),
            command: vec!["loom".to_string(), "execute".to_string()],
            volumes: Vec::new(),
            env: Vec::new(),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Root under which every artifact location is built
    pub pipeline_root: String,

    /// Symbolic prefix replaced by the local directory (e.g. "gs://")
    pub symbolic_prefix: String,

    /// Local directory standing in for the symbolic prefix
    pub local_dir: PathBuf,

    /// Execution mode used for every step of a run
    pub mode: ExecutionMode,

    /// Fail a containerized step whose declared outputs are missing
    pub verify_outputs: bool,

    pub container: ContainerConfig,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults for everything else
    pub fn new(pipeline_root: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_root: pipeline_root.into(),
            symbolic_prefix: DEFAULT_SYMBOLIC_PREFIX.to_string(),
            local_dir: local_dir.into(),
            mode: ExecutionMode::InProcess,
            verify_outputs: false,
            container: ContainerConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - LOOM_PIPELINE_ROOT (default: gs:///vertex-ai/pipeline_root)
    /// - LOOM_SYMBOLIC_PREFIX (default: gs://)
    /// - LOOM_LOCAL_DIR (default: ./gcs)
    /// - LOOM_MODE (in-process or container, default: in-process)
    /// - LOOM_CONTAINER_RUNTIME (default: podman)
    /// - LOOM_MOUNT_POINT (default: /gcs)
    /// - LOOM_IMAGE (default image for steps without one)
    /// - LOOM_VERIFY_OUTPUTS (true/false, default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup("LOOM_PIPELINE_ROOT") {
            config.pipeline_root = root;
        }
        if let Some(prefix) = lookup("LOOM_SYMBOLIC_PREFIX") {
            config.symbolic_prefix = prefix;
        }
        if let Some(dir) = lookup("LOOM_LOCAL_DIR") {
            config.local_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("LOOM_MODE") {
            config.mode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Some(runtime) = lookup("LOOM_CONTAINER_RUNTIME") {
            config.container.runtime = runtime;
        }
        if let Some(mount_point) = lookup("LOOM_MOUNT_POINT") {
            config.container.mount_point = mount_point;
        }
        if let Some(image) = lookup("LOOM_IMAGE") {
            config.container.default_image = image;
        }
        if let Some(verify) = lookup("LOOM_VERIFY_OUTPUTS") {
            config.verify_outputs = parse_flag(&verify).ok_or_else(|| {
                anyhow::anyhow!("LOOM_VERIFY_OUTPUTS must be true or false, got '{}'", verify)
            })?;
        }

        Ok(config)
    }

    /// Sets the execution mode
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Translation of symbolic locations onto the local directory
    pub fn local_mount(&self) -> LocalMount {
        LocalMount::new(self.symbolic_prefix.clone(), self.local_dir.clone())
    }

    /// Translation of symbolic locations inside a step container
    pub fn container_mount(&self) -> LocalMount {
        self.local_mount()
            .rebase(PathBuf::from(&self.container.mount_point))
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline_root.is_empty() {
            anyhow::bail!("pipeline_root cannot be empty");
        }

        if self.symbolic_prefix.is_empty() {
            anyhow::bail!("symbolic_prefix cannot be empty");
        }

        if self.local_dir.as_os_str().is_empty() {
            anyhow::bail!("local_dir cannot be empty");
        }

        if root_overlaps_result_files(&self.pipeline_root, &self.symbolic_prefix) {
            anyhow::bail!(
                "pipeline_root '{}' must be a directory below symbolic_prefix '{}'",
                self.pipeline_root,
                self.symbolic_prefix
            );
        }

        if self.container.runtime.is_empty() {
            anyhow::bail!("container runtime cannot be empty");
        }

        if !self.container.mount_point.starts_with('/') {
            anyhow::bail!("mount_point must be an absolute path inside the container");
        }

        if self.mode == ExecutionMode::Container && self.container.command.is_empty() {
            anyhow::bail!("container command cannot be empty");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PIPELINE_ROOT, "./gcs")
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
