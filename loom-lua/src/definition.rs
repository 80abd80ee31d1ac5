//! Pipeline definitions written in Lua
//!
//! A pipeline file returns a table describing the pipeline parameters and
//! the ordered steps. Each step declares its scalar parameters, input and
//! output artifacts, optional container settings, and a `run` function used
//! as the step body.
//!
//! ```lua
//! return pipeline.define({
//!   name = "my-pipeline",
//!   parameters = { epochs = { type = "int", default = 500 } },
//!   steps = {
//!     pipeline.step({
//!       name = "create_data",
//!       outputs = { data = "system.Dataset" },
//!       run = function(args) fs.write(args.outputs.data, "x,y\n") end,
//!     }),
//!     pipeline.step({
//!       name = "train",
//!       parameters = { epochs = "int" },
//!       inputs = { data = pipeline.input("system.Dataset", "create_data.data") },
//!       outputs = { model = "system.Model" },
//!       image = "python:3.9",
//!       cpu_limit = "2",
//!       run = function(args) log.info(fs.read(args.inputs.data)) end,
//!     }),
//!   },
//! })
//! ```

use anyhow::{Context, Result};
use loom_core::domain::artifact::schema;
use loom_core::{
    ArtifactBinding, ParameterType, Pipeline, PipelineParameter, PipelineStep, StepDeclaration,
};
use mlua::{Function, Lua, LuaSerdeExt, Table, Value};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::module::ModuleRegistry;
use crate::sandbox::create_sandbox;
use crate::step::LuaStep;

#[derive(Debug, Deserialize)]
struct ParameterSpec {
    #[serde(rename = "type")]
    parameter_type: String,
    #[serde(default)]
    default: Option<JsonValue>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputSpec {
    Schema(String),
    Wired {
        #[serde(rename = "type", default)]
        schema: Option<String>,
        #[serde(default)]
        from: Option<String>,
    },
}

/// Load a pipeline from a Lua file
pub fn load_pipeline_file(path: &Path, registry: &ModuleRegistry) -> Result<Pipeline> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    load_pipeline(&source, registry)
        .with_context(|| format!("Failed to load pipeline file {}", path.display()))
}

/// Load a pipeline from Lua source
///
/// The source is evaluated in a fresh sandbox with the registry's modules;
/// step bodies stay bound to that sandbox.
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or does not return a table
/// - Required fields are missing (pipeline name, steps, step name, step run)
/// - A type name is unknown or a default does not match its type
/// - The resulting pipeline fails validation (duplicate step names,
///   bindings to steps that do not run earlier)
pub fn load_pipeline(source: &str, registry: &ModuleRegistry) -> Result<Pipeline> {
    let lua = create_sandbox(registry).context("Failed to create sandbox")?;

    let definition: Table = lua
        .load(source)
        .set_name("pipeline")
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    let name: String = definition
        .get("name")
        .context("Pipeline must have a 'name' field")?;
    let description: Option<String> = definition
        .get("description")
        .context("Field 'description' must be a string")?;

    let mut pipeline = Pipeline::new(name);
    pipeline.description = description;
    pipeline.parameters = parse_parameters(&lua, &definition)?;
    pipeline.steps = parse_steps(&lua, &definition)?;

    pipeline.validate()?;
    debug!(
        "Loaded pipeline '{}' with {} step(s)",
        pipeline.name,
        pipeline.steps.len()
    );

    Ok(pipeline)
}

fn parse_type(name: &str, owner: &str) -> Result<ParameterType> {
    ParameterType::parse(name)
        .ok_or_else(|| anyhow::anyhow!("{} has unknown type '{}'", owner, name))
}

/// Parse the pipeline-level `parameters` table
fn parse_parameters(lua: &Lua, definition: &Table) -> Result<Vec<PipelineParameter>> {
    let table: Option<Table> = definition
        .get("parameters")
        .context("Field 'parameters' must be a table")?;
    let Some(table) = table else {
        return Ok(Vec::new());
    };

    let mut parameters = Vec::new();
    for pair in table.pairs::<String, Value>() {
        let (name, value) = pair.context("Failed to read parameters entry")?;
        let spec: ParameterSpec = lua
            .from_value(value)
            .with_context(|| format!("Parameter '{}' must have a 'type' field", name))?;

        let parameter_type = parse_type(&spec.parameter_type, &format!("Parameter '{}'", name))?;
        if let Some(default) = &spec.default {
            if !parameter_type.accepts(default) {
                anyhow::bail!(
                    "Parameter '{}' default {} is not a valid {}",
                    name,
                    default,
                    parameter_type
                );
            }
        }

        parameters.push(PipelineParameter {
            name,
            parameter_type,
            default: spec.default,
            description: spec.description,
        });
    }

    parameters.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(parameters)
}

/// Parse the ordered `steps` array
fn parse_steps(lua: &Lua, definition: &Table) -> Result<Vec<PipelineStep>> {
    let steps: Table = definition
        .get("steps")
        .context("Pipeline must have a 'steps' field")?;

    let mut parsed = Vec::new();
    for entry in steps.sequence_values::<Table>() {
        let step = entry.context("Failed to read step entry")?;
        parsed.push(parse_step(lua, &step)?);
    }

    if parsed.is_empty() {
        anyhow::bail!("Pipeline must have at least one step");
    }

    Ok(parsed)
}

fn parse_step(lua: &Lua, step: &Table) -> Result<PipelineStep> {
    let name: String = step.get("name").context("Step must have a 'name' field")?;
    let owner = format!("Step '{}'", name);

    let mut declaration = StepDeclaration::new(name.clone());

    for (parameter, type_name) in sorted_pairs::<String>(step, "parameters", &owner)? {
        let parameter_type = parse_type(&type_name, &format!("{} parameter '{}'", owner, parameter))?;
        declaration = declaration.parameter(parameter, parameter_type);
    }

    let mut bindings = Vec::new();
    for (input, value) in sorted_pairs::<Value>(step, "inputs", &owner)? {
        let spec: InputSpec = lua
            .from_value(value)
            .with_context(|| format!("{} input '{}' must be a schema title or table", owner, input))?;

        let (schema_title, from) = match spec {
            InputSpec::Schema(schema_title) => (schema_title, None),
            InputSpec::Wired { schema, from } => {
                (schema.unwrap_or_else(|| schema::ARTIFACT.to_string()), from)
            }
        };

        if let Some(from) = from {
            let binding = ArtifactBinding::parse(&from).ok_or_else(|| {
                anyhow::anyhow!(
                    "{} input '{}' has invalid source '{}', expected 'step.artifact'",
                    owner,
                    input,
                    from
                )
            })?;
            bindings.push((input.clone(), binding));
        }

        declaration = declaration.input(input, schema_title);
    }

    for (output, schema_title) in sorted_pairs::<String>(step, "outputs", &owner)? {
        declaration = declaration.output(output, schema_title);
    }

    let image: Option<String> = step
        .get("image")
        .with_context(|| format!("{} field 'image' must be a string", owner))?;
    if let Some(image) = image {
        declaration = declaration.with_image(image);
    }

    let command: Option<Vec<String>> = step
        .get("command")
        .with_context(|| format!("{} field 'command' must be an array of strings", owner))?;
    if let Some(command) = command {
        declaration = declaration.with_command(command);
    }

    let cpu_limit: Value = step.get("cpu_limit")?;
    match cpu_limit {
        Value::Nil => {}
        Value::String(s) => {
            let limit = s.to_str()?;
            declaration = declaration.with_cpu_limit(&*limit);
        }
        Value::Integer(i) => declaration = declaration.with_cpu_limit(i.to_string()),
        Value::Number(n) => declaration = declaration.with_cpu_limit(n.to_string()),
        _ => anyhow::bail!("{} field 'cpu_limit' must be a string or number", owner),
    }

    let run: Function = step
        .get("run")
        .with_context(|| format!("{} must have a 'run' function", owner))?;

    let body = Arc::new(LuaStep::new(lua.clone(), run));
    let mut pipeline_step = PipelineStep::new(declaration, body);
    for (input, binding) in bindings {
        pipeline_step = pipeline_step.bind(input, binding);
    }

    Ok(pipeline_step)
}

/// Reads an optional `name -> value` table, sorted by name
fn sorted_pairs<V: mlua::FromLua>(
    step: &Table,
    field: &str,
    owner: &str,
) -> Result<Vec<(String, V)>> {
    let table: Option<Table> = step
        .get(field)
        .with_context(|| format!("{} field '{}' must be a table", owner, field))?;
    let Some(table) = table else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for pair in table.pairs::<String, V>() {
        let entry = pair.with_context(|| format!("Failed to read {} entry of {}", field, owner))?;
        entries.push(entry);
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
