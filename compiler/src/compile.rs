//! `compiler compile`: load, compile, and emit a workflow's job graph.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::compiler::{CompiledWorkflow, compile};
use crate::core::handlers::HandlerRegistry;
use crate::core::threat_detection::CommandEngine;
use crate::io::config::{CompilerSettings, load_settings};
use crate::io::graph_store::write_graph;
use crate::io::workflow_loader::load_workflow;

/// Inputs for one compile run.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub workflow_path: &'a Path,
    /// Settings file; defaults apply when absent or missing on disk.
    pub config_path: Option<&'a Path>,
    /// Where to write the graph JSON, if anywhere.
    pub output_path: Option<&'a Path>,
    /// Force strict permission checking.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub workflow_name: String,
    pub compiled: CompiledWorkflow,
    /// Job names in dependency order.
    pub order: Vec<String>,
}

pub fn run_compile(request: &CompileRequest<'_>) -> Result<CompileOutcome> {
    let mut settings = match request.config_path {
        Some(path) => load_settings(path)?,
        None => CompilerSettings::default(),
    };
    settings.strict |= request.strict;

    let data = load_workflow(request.workflow_path)?;
    let registry = HandlerRegistry::with_defaults();
    let engine = CommandEngine::new(settings.detection_command.clone());
    let compiled = compile(&data, &registry, &engine, &settings.compile_options())
        .with_context(|| format!("compile {}", request.workflow_path.display()))?;
    let order = compiled.graph.topological_order()?;

    if let Some(path) = request.output_path {
        write_graph(path, &compiled.graph)?;
    }
    info!(
        workflow = %data.name,
        jobs = compiled.graph.len(),
        output = ?request.output_path,
        "compile complete"
    );
    Ok(CompileOutcome {
        workflow_name: data.name,
        compiled,
        order,
    })
}
