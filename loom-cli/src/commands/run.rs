//! Run and describe command handlers

use anyhow::{Context, Result};
use colored::*;
use loom_core::domain::log::{LogEntry, LogLevel};
use loom_core::{LocalMount, Pipeline};
use loom_runner::{InMemoryLogBuffer, LogBufferService, PipelineDriver, RunReport, load_pipeline_file};
use std::path::Path;
use std::sync::Arc;

use crate::config::RunnerArgs;

/// Run a whole pipeline or one of its steps
pub async fn run_pipeline(
    pipeline_file: &Path,
    params: &[(String, String)],
    step: Option<&str>,
    isolated: bool,
    runner: RunnerArgs,
) -> Result<()> {
    let config = runner.into_config(pipeline_file)?;
    let buffer = InMemoryLogBuffer::new();
    let log_buffer: Arc<dyn LogBufferService> = Arc::new(buffer.clone());

    let pipeline = load_pipeline_file(pipeline_file, log_buffer.clone())?;
    let parameters = pipeline
        .parameter_values(params)
        .context("Invalid pipeline parameters")?;

    let mount = config.local_mount();
    let mode = config.mode;
    let driver = PipelineDriver::standard(config, log_buffer);

    println!(
        "{} {} ({})",
        "Running".bold(),
        describe_target(&pipeline, step).cyan(),
        mode.to_string().dimmed()
    );

    let result = match step {
        Some(name) => driver.run_step(&pipeline, name, &parameters, isolated).await,
        None => driver.run(&pipeline, &parameters).await,
    };

    match result {
        Ok(report) => {
            print_report(&report, &mount);
            Ok(())
        }
        Err(e) => {
            print_logs(&buffer.drain());
            println!(
                "{}",
                format!("✗ {} failed", describe_target(&pipeline, step))
                    .red()
                    .bold()
            );
            Err(e.into())
        }
    }
}

/// Print the executor input a step would receive
pub fn describe_step(
    pipeline_file: &Path,
    step: &str,
    params: &[(String, String)],
    isolated: bool,
    runner: RunnerArgs,
) -> Result<()> {
    let config = runner.into_config(pipeline_file)?;
    let log_buffer: Arc<dyn LogBufferService> = Arc::new(InMemoryLogBuffer::new());

    let pipeline = load_pipeline_file(pipeline_file, log_buffer.clone())?;
    let parameters = pipeline
        .parameter_values(params)
        .context("Invalid pipeline parameters")?;

    let mount = config.local_mount();
    let driver = PipelineDriver::standard(config, log_buffer);
    let descriptor = driver.describe(&pipeline, step, &parameters, isolated)?;

    println!("{}", descriptor.to_json_pretty()?);
    println!();
    println!("{}", "Local paths:".bold());
    for (name, reference) in &descriptor.inputs {
        println!(
            "  {} {} {}",
            "in ".dimmed(),
            name.cyan(),
            mount.localize(&reference.uri).display()
        );
    }
    for (name, reference) in &descriptor.outputs {
        println!(
            "  {} {} {}",
            "out".dimmed(),
            name.cyan(),
            mount.localize(&reference.uri).display()
        );
    }
    println!(
        "  {} {}",
        "result file".dimmed(),
        mount.localize(&descriptor.output_file).display()
    );

    Ok(())
}

fn describe_target(pipeline: &Pipeline, step: Option<&str>) -> String {
    match step {
        Some(step) => format!("step '{}' of pipeline '{}'", step, pipeline.name),
        None => format!("pipeline '{}'", pipeline.name),
    }
}

fn print_report(report: &RunReport, mount: &LocalMount) {
    print_logs(&report.logs);

    println!(
        "{}",
        format!("✓ Pipeline '{}' completed", report.pipeline)
            .green()
            .bold()
    );
    println!("  Run ID: {}", report.run_id.to_string().cyan());

    for output in &report.outputs {
        println!("  {}", output.step_name.bold());
        if output.is_empty() {
            println!("    {}", "(no outputs)".dimmed());
        }
        for (name, reference) in &output.artifacts {
            println!(
                "    {} -> {}",
                name.cyan(),
                mount.localize(&reference.uri).display()
            );
        }
    }
}

fn print_logs(entries: &[LogEntry]) {
    if entries.is_empty() {
        return;
    }

    println!("{}", "Run log:".bold());
    for entry in entries {
        let level = match entry.level {
            LogLevel::Debug => entry.level.to_string().dimmed(),
            LogLevel::Info => entry.level.to_string().normal(),
            LogLevel::Warning => entry.level.to_string().yellow(),
            LogLevel::Error => entry.level.to_string().red(),
        };
        let step = entry
            .step
            .as_ref()
            .map(|s| format!("[{}] ", s))
            .unwrap_or_default();

        println!(
            "  {} {} {}{}",
            entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
            level,
            step.cyan(),
            entry.message
        );
    }
    println!();
}
