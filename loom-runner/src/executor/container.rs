//! Containerized step execution
//!
//! Each step runs in a fresh container:
//! - the local artifact directory is bind-mounted at the mount point
//! - the serialized descriptor is passed on the command line
//! - stdout and stderr are streamed into the run log until the container exits
//! - the container is removed when it exits (`--rm`)

use loom_core::domain::log::LogLevel;
use loom_core::{ExecutorDescriptor, LoomError, Result, StepDeclaration, StepOutput};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::prepare_output_dirs;
use crate::config::RunnerConfig;
use crate::service::LogBufferService;

/// Checks that the container runtime is installed and working
pub fn check_runtime_available(runtime: &str) -> Result<()> {
    let output = std::process::Command::new(runtime)
        .arg("--version")
        .output()
        .map_err(|e| {
            LoomError::RuntimeUnavailable(format!(
                "failed to execute '{} --version' ({}). Is {} installed?",
                runtime, e, runtime
            ))
        })?;

    if !output.status.success() {
        return Err(LoomError::RuntimeUnavailable(format!(
            "'{}' is not working correctly",
            runtime
        )));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container runtime is available: {}", version.trim());

    Ok(())
}

/// Launches one step container
pub struct ContainerStepRunner<'a> {
    config: &'a RunnerConfig,
    run_id: Uuid,
}

impl<'a> ContainerStepRunner<'a> {
    pub fn new(config: &'a RunnerConfig, run_id: Uuid) -> Self {
        Self { config, run_id }
    }

    /// Builds the runtime arguments for a step
    ///
    /// # Arguments
    /// * `step` - Declaration supplying image, command and CPU limit
    /// * `descriptor` - Resolved descriptor passed as `--executor-input`
    /// * `host_dir` - Absolute local artifact directory to mount
    pub fn build_run_args(
        &self,
        step: &StepDeclaration,
        descriptor: &ExecutorDescriptor,
        host_dir: &Path,
    ) -> Result<Vec<String>> {
        let container = &self.config.container;

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name(&step.name),
            "-v".to_string(),
            format!("{}:{}", host_dir.display(), container.mount_point),
        ];

        for (host, target) in &container.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), target));
        }

        // The entrypoint inside translates locations against the mount
        args.push("-e".to_string());
        args.push(format!("LOOM_LOCAL_DIR={}", container.mount_point));
        args.push("-e".to_string());
        args.push(format!("LOOM_SYMBOLIC_PREFIX={}", self.config.symbolic_prefix));
        for (key, value) in &container.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if let Some(cpus) = &step.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }

        args.push(
            step.image
                .clone()
                .unwrap_or_else(|| container.default_image.clone()),
        );

        if step.command.is_empty() {
            args.extend(container.command.iter().cloned());
        } else {
            args.extend(step.command.iter().cloned());
        }

        args.push("--executor-input".to_string());
        args.push(descriptor.to_json()?);
        args.push("--function-to-execute".to_string());
        args.push(step.name.clone());

        Ok(args)
    }

    /// Runs the step container to completion
    pub async fn run(
        &self,
        step: &StepDeclaration,
        descriptor: &ExecutorDescriptor,
        log_buffer: &dyn LogBufferService,
    ) -> Result<StepOutput> {
        let mount = self.config.local_mount();
        prepare_output_dirs(descriptor, &mount)?;

        std::fs::create_dir_all(&self.config.local_dir)?;
        let host_dir = std::fs::canonicalize(&self.config.local_dir)?;

        let runtime = &self.config.container.runtime;
        let args = self.build_run_args(step, descriptor, &host_dir)?;
        info!(
            "Launching container for step '{}' with {}",
            step.name, runtime
        );
        debug!("{} {}", runtime, args.join(" "));

        let mut child = Command::new(runtime)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LoomError::step_execution(
                    &step.name,
                    format!("failed to launch '{}': {}", runtime, e),
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, _, _) = tokio::join!(
            child.wait(),
            forward_lines(stdout, &step.name, "stdout", log_buffer),
            forward_lines(stderr, &step.name, "stderr", log_buffer),
        );
        let status = status?;

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            error!(
                "Container for step '{}' exited with code {}",
                step.name, exit_code
            );
            return Err(LoomError::step_execution(
                &step.name,
                format!("container exited with code {}", exit_code),
            ));
        }

        self.check_outputs(descriptor)?;

        Ok(descriptor.step_output())
    }

    /// Looks for every declared output after the container exited
    ///
    /// Missing outputs are reported as warnings unless `verify_outputs` is
    /// set, in which case the first one fails the step.
    fn check_outputs(&self, descriptor: &ExecutorDescriptor) -> Result<()> {
        let mount = self.config.local_mount();

        for (name, reference) in &descriptor.outputs {
            let path = mount.localize(&reference.uri);
            if path.exists() {
                continue;
            }

            if self.config.verify_outputs {
                return Err(LoomError::artifact_not_found(path));
            }

            warn!(
                "Step '{}' did not write output '{}' at {}",
                descriptor.step_name,
                name,
                path.display()
            );
        }

        Ok(())
    }

    /// Container name unique to this run and step
    fn container_name(&self, step_name: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        step_name.hash(&mut hasher);
        let hash = hasher.finish();

        format!("loom-{}-{:x}", self.run_id, hash)
    }
}

/// Streams lines of a child stream into tracing and the run log
///
/// Lines are decoded lossily. The stream is read to EOF even after a read
/// error so the container never blocks on a full pipe.
async fn forward_lines<R>(
    reader: Option<R>,
    step: &str,
    stream: &str,
    log_buffer: &dyn LogBufferService,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                info!(step = step, stream = stream, "{}", line);
                log_buffer.log(LogLevel::Info, Some(step), line);
            }
            Err(e) => {
                warn!("Failed to read container {} for '{}': {}", stream, step, e);
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    warn!("Discarding container {} for '{}' failed: {}", stream, step, e);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ArtifactMapping, ProvidedValues, Resolver};
    use crate::service::InMemoryLogBuffer;
    use loom_core::ParameterType;
    use loom_core::domain::artifact::schema;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn train() -> StepDeclaration {
        StepDeclaration::new("train")
            .parameter("epochs", ParameterType::Int)
            .input("data", schema::DATASET)
            .output("model", schema::MODEL)
    }

    fn descriptor(step: &StepDeclaration) -> ExecutorDescriptor {
        let mut parameters = BTreeMap::new();
        parameters.insert("epochs".to_string(), json!(500));
        Resolver::new("gs://root", "gs://")
            .resolve(step, &ProvidedValues::new(parameters), &ArtifactMapping::new())
            .unwrap()
    }

    fn config(local_dir: &Path, runtime: &str) -> RunnerConfig {
        let mut config = RunnerConfig::new("gs://root", local_dir);
        config.container.runtime = runtime.to_string();
        config
    }

    #[test]
    fn test_run_args_layout() {
        let config = RunnerConfig::new("gs://root", "./gcs");
        let runner = ContainerStepRunner::new(&config, Uuid::nil());
        let step = train().with_image("docker.io/library/python:3.11").with_cpu_limit("2");
        let d = descriptor(&step);

        let args = runner
            .build_run_args(&step, &d, Path::new("/home/dev/gcs"))
            .unwrap();

        assert_eq!(&args[..3], &["run", "--rm", "--name"]);
        assert!(args[3].starts_with("loom-00000000-0000-0000-0000-000000000000-"));
        assert_eq!(&args[4..6], &["-v", "/home/dev/gcs:/gcs"]);

        let cpus = args.iter().position(|a| a == "--cpus").unwrap();
        assert_eq!(args[cpus + 1], "2");
        assert_eq!(args[cpus + 2], "docker.io/library/python:3.11");
        assert_eq!(&args[cpus + 3..cpus + 5], &["loom", "execute"]);

        let n = args.len();
        assert_eq!(args[n - 4], "--executor-input");
        assert_eq!(
            ExecutorDescriptor::from_json("train", &args[n - 3]).unwrap(),
            d
        );
        assert_eq!(&args[n - 2..], &["--function-to-execute", "train"]);
    }

    #[test]
    fn test_run_args_defaults_and_overrides() {
        let config = RunnerConfig {
            container: crate::config::ContainerConfig::default()
                .with_volume("/src/pipelines", "/pipeline")
                .with_command_args(["--pipeline", "/pipeline/demo.lua"]),
            ..RunnerConfig::new("gs://root", "./gcs")
        };
        let runner = ContainerStepRunner::new(&config, Uuid::nil());

        let step = StepDeclaration::new("report");
        let args = runner
            .build_run_args(&step, &descriptor(&step), Path::new("/abs/gcs"))
            .unwrap();
        assert!(!args.contains(&"--cpus".to_string()));
        assert!(args.contains(&"/src/pipelines:/pipeline".to_string()));
        assert!(args.contains(&"LOOM_LOCAL_DIR=/gcs".to_string()));
        assert!(args.contains(&"localhost/loom:latest".to_string()));
        assert!(args.contains(&"/pipeline/demo.lua".to_string()));

        let custom = StepDeclaration::new("report")
            .with_command(vec!["python".to_string(), "-m".to_string(), "report".to_string()]);
        let args = runner
            .build_run_args(&custom, &descriptor(&custom), Path::new("/abs/gcs"))
            .unwrap();
        assert!(args.contains(&"python".to_string()));
        assert!(!args.contains(&"execute".to_string()));
    }

    #[test]
    fn test_container_names_differ_per_step() {
        let config = RunnerConfig::default();
        let runner = ContainerStepRunner::new(&config, Uuid::new_v4());
        assert_ne!(runner.container_name("a"), runner.container_name("b"));
        assert_eq!(runner.container_name("a"), runner.container_name("a"));
    }

    #[test]
    fn test_missing_runtime_is_reported() {
        let err = check_runtime_available("loom-no-such-runtime").unwrap_err();
        assert!(matches!(err, LoomError::RuntimeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_step_execution() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), "false");
        let buffer = InMemoryLogBuffer::new();
        let step = train();

        let err = ContainerStepRunner::new(&config, Uuid::new_v4())
            .run(&step, &descriptor(&step), &buffer)
            .await
            .unwrap_err();

        assert!(err.is_step_execution());
        assert!(err.to_string().contains("exited with code 1"));
        // Output directory is prepared before launch
        assert!(dir.path().join("root").join("train").is_dir());
    }

    #[tokio::test]
    async fn test_unlaunchable_runtime_is_step_execution() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), "loom-no-such-runtime");
        let buffer = InMemoryLogBuffer::new();
        let step = StepDeclaration::new("report");

        let err = ContainerStepRunner::new(&config, Uuid::new_v4())
            .run(&step, &descriptor(&step), &buffer)
            .await
            .unwrap_err();
        assert!(err.is_step_execution());
    }

    #[tokio::test]
    async fn test_missing_outputs_warn_by_default() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), "true");
        let buffer = InMemoryLogBuffer::new();
        let step = train();

        let output = ContainerStepRunner::new(&config, Uuid::new_v4())
            .run(&step, &descriptor(&step), &buffer)
            .await
            .unwrap();
        assert_eq!(output.artifact("model").unwrap().uri, "gs://root/train/model");
    }

    /// Writes an executable shell script standing in for the container runtime
    #[cfg(unix)]
    fn fake_runtime(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-runtime.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_forward_lines_survives_invalid_utf8() {
        let buffer = InMemoryLogBuffer::new();
        let output: &[u8] = b"start\n\xff\xfe\nafter\r\ndone";

        forward_lines(Some(output), "report", "stdout", &buffer).await;

        let entries = buffer.drain();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["start", "\u{fffd}\u{fffd}", "after", "done"]);
        assert!(entries.iter().all(|e| e.step.as_deref() == Some("report")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_container_output_reaches_run_log() {
        let dir = tempdir().unwrap();
        let runtime = fake_runtime(
            dir.path(),
            "echo start\nprintf '\\377\\376\\n'\necho warming up >&2\nsleep 0.2\necho after\necho done\nexit 0",
        );
        let config = config(&dir.path().join("gcs"), &runtime.display().to_string());
        let buffer = InMemoryLogBuffer::new();
        let step = StepDeclaration::new("report");

        ContainerStepRunner::new(&config, Uuid::new_v4())
            .run(&step, &descriptor(&step), &buffer)
            .await
            .unwrap();

        let entries = buffer.drain();
        assert!(entries.iter().all(|e| e.step.as_deref() == Some("report")));
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        for expected in ["start", "warming up", "after", "done"] {
            assert!(messages.contains(&expected), "missing '{}' in {:?}", expected, messages);
        }
        let stdout: Vec<&str> = messages
            .iter()
            .copied()
            .filter(|m| *m != "warming up")
            .collect();
        assert_eq!(stdout, vec!["start", "\u{fffd}\u{fffd}", "after", "done"]);
    }

    #[tokio::test]
    async fn test_missing_outputs_fail_when_verified() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), "true");
        config.verify_outputs = true;
        let buffer = InMemoryLogBuffer::new();
        let step = train();

        let err = ContainerStepRunner::new(&config, Uuid::new_v4())
            .run(&step, &descriptor(&step), &buffer)
            .await
            .unwrap_err();

        assert!(err.is_artifact_not_found());
        assert!(err.to_string().contains(&PathBuf::from("root").join("train").join("model").display().to_string()));
    }
}
