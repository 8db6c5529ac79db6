//! Workflow loading: TOML parse, schema validation, typed model.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::workflow::WorkflowData;

const WORKFLOW_SCHEMA: &str = include_str!("../../schemas/workflow.schema.json");

/// Load a workflow file and validate it against the workflow schema.
///
/// When the file does not set `source`, its path is used, so the workflow id
/// defaults to the file stem.
pub fn load_workflow(path: &Path) -> Result<WorkflowData> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut data =
        parse_workflow(&contents).with_context(|| format!("load workflow {}", path.display()))?;
    if data.source.is_none() {
        data.source = Some(path.display().to_string());
    }
    debug!(
        workflow = %data.name,
        jobs = data.jobs.len(),
        safe_outputs = data.safe_outputs.is_some(),
        "loaded workflow"
    );
    Ok(data)
}

/// Parse workflow TOML text: schema conformance, then the typed model.
pub fn parse_workflow(contents: &str) -> Result<WorkflowData> {
    let raw: toml::Value = toml::from_str(contents).context("parse workflow toml")?;
    let instance = serde_json::to_value(&raw).context("convert workflow to json")?;
    validate_schema(&instance)?;
    let data: WorkflowData =
        serde_json::from_value(instance).context("deserialize workflow")?;
    Ok(data)
}

/// Validate a JSON instance against the workflow schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(WORKFLOW_SCHEMA).context("parse workflow schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile workflow schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
