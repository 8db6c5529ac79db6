//! Job graph compiler.
//!
//! Turns a [`WorkflowData`] into a validated [`JobGraph`]:
//! - `pre_activation` (optional) -> `activation` -> `agent` roots;
//! - an optional `detection` job gating every safe-output job;
//! - one job per enabled handler, plus custom safe-output jobs;
//! - workflow-level custom jobs placed before activation or after agent;
//! - implicit edges from `needs.<job>.` references;
//! - a terminal `conclusion` job.
//!
//! Compilation is fail-fast: the first error aborts and no graph is returned.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::core::env_manifest;
use crate::core::error::CompileError;
use crate::core::expression::{self, Expr};
use crate::core::handlers::{
    AGENT_OUTPUT_ARTIFACT, HandlerContext, HandlerRegistry, StepConfig,
};
use crate::core::needs_scan::referenced_jobs;
use crate::core::permission_validator::validate_permissions;
use crate::core::permissions::{PermissionLevel, PermissionScope, Permissions};
use crate::core::threat_detection::{self, DetectionEngine};
use crate::core::types::SafeOutputType;
use crate::job::{
    ACTIVATION_JOB, AGENT_JOB, BUILTIN_JOBS, CONCLUSION_JOB, DETECTION_JOB, Job, JobGraph,
    PRE_ACTIVATION_JOB, Step,
};
use crate::workflow::{CustomJobConfig, SafeOutputsConfig, WorkflowData};

const SAFE_OUTPUTS_DIR: &str = "/tmp/gh-aw/safe-outputs/";
const AGENT_SAFE_OUTPUTS_FILE: &str = "/tmp/gh-aw/safeoutputs/outputs.jsonl";
const GITHUB_SCRIPT: &str = "actions/github-script@v8";

/// Output types whose jobs report back to the triggering item themselves,
/// so the conclusion job stays out of their way.
const OWN_UPDATE_PATHS: &[SafeOutputType] = &[
    SafeOutputType::AddComment,
    SafeOutputType::CreatePullRequest,
    SafeOutputType::PushToPullRequestBranch,
];

/// Settings that are not part of the workflow itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Treat excess permissions as errors.
    pub strict: bool,
    pub runs_on: String,
    pub safe_output_timeout_minutes: u32,
    pub agent_timeout_minutes: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict: false,
            runs_on: "ubuntu-latest".to_string(),
            safe_output_timeout_minutes: 10,
            agent_timeout_minutes: 20,
        }
    }
}

/// A validated job graph plus non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledWorkflow {
    pub graph: JobGraph,
    pub warnings: Vec<String>,
}

pub fn compile(
    data: &WorkflowData,
    registry: &HandlerRegistry,
    engine: &dyn DetectionEngine,
    options: &CompileOptions,
) -> Result<CompiledWorkflow, CompileError> {
    if data.name.trim().is_empty() {
        return Err(CompileError::config("workflow name cannot be empty"));
    }
    let strict = data.strict || options.strict;
    let warnings = check_permissions(data, strict)?;
    check_custom_jobs(data)?;

    let runs_on = data.runs_on.as_deref().unwrap_or(&options.runs_on);
    let custom_names: BTreeSet<String> = data
        .jobs
        .keys()
        .chain(data.safe_outputs.iter().flat_map(|outputs| outputs.jobs.keys()))
        .cloned()
        .collect();

    let mut graph = JobGraph::new();
    let early_jobs: Vec<&str> = data
        .jobs
        .iter()
        .filter(|(_, config)| config.needs.iter().any(|need| need == PRE_ACTIVATION_JOB))
        .map(|(name, _)| name.as_str())
        .collect();
    let has_pre_activation =
        data.command.is_some() || data.stop_time.is_some() || !early_jobs.is_empty();
    if has_pre_activation {
        graph.add_job(build_pre_activation_job(data, runs_on))?;
    }
    graph.add_job(build_activation_job(
        data,
        runs_on,
        has_pre_activation,
        &early_jobs,
    ))?;
    graph.add_job(build_agent_job(data, runs_on, options)?)?;

    for (name, config) in &data.jobs {
        let mut job = custom_job(name, config, runs_on);
        if !job.needs_job(PRE_ACTIVATION_JOB) {
            job.add_need(AGENT_JOB);
        }
        graph.add_job(job)?;
    }

    if let Some(safe_outputs) = &data.safe_outputs {
        add_safe_output_jobs(
            &mut graph,
            data,
            safe_outputs,
            registry,
            engine,
            runs_on,
            options,
        )?;
    }

    wire_references(&mut graph, &custom_names);
    graph.validate()?;
    info!(jobs = graph.len(), warnings = warnings.len(), "compiled workflow");
    Ok(CompiledWorkflow { graph, warnings })
}

/// Missing permissions are fatal; excess ones are warnings unless strict.
fn check_permissions(data: &WorkflowData, strict: bool) -> Result<Vec<String>, CompileError> {
    let Some(tool) = &data.github_tool else {
        debug!("no github tool configured, skipping permission validation");
        return Ok(Vec::new());
    };
    let result = validate_permissions(&tool.toolsets, tool.read_only, &data.permissions);
    if !result.missing.is_empty() || (strict && !result.excess.is_empty()) {
        return Err(CompileError::Permission(result.format_message(strict)));
    }
    if result.excess.is_empty() {
        return Ok(Vec::new());
    }
    let message = result.format_message(false);
    warn!(excess = ?result.excess, "over-provisioned permissions");
    Ok(vec![message])
}

fn check_custom_jobs(data: &WorkflowData) -> Result<(), CompileError> {
    let safe_jobs = data.safe_outputs.iter().flat_map(|outputs| &outputs.jobs);
    for (name, config) in data.jobs.iter().chain(safe_jobs) {
        if BUILTIN_JOBS.contains(&name.as_str()) {
            return Err(CompileError::config(format!(
                "job name '{name}' is reserved"
            )));
        }
        if config.steps.is_empty() {
            return Err(CompileError::config(format!("job '{name}' has no steps")));
        }
    }
    Ok(())
}

fn custom_job(name: &str, config: &CustomJobConfig, runs_on: &str) -> Job {
    let mut job = Job::new(name, config.runs_on.as_deref().unwrap_or(runs_on));
    for need in &config.needs {
        job.add_need(need);
    }
    job.condition = config.condition.clone();
    job.permissions = config.permissions.clone().unwrap_or_default();
    job.timeout_minutes = config.timeout_minutes;
    job.env = config.env.clone();
    job.outputs = config.outputs.clone();
    job.steps = config.steps.clone();
    job
}

fn build_pre_activation_job(data: &WorkflowData, runs_on: &str) -> Job {
    let mut job = Job::new(PRE_ACTIVATION_JOB, runs_on);
    job.permissions = Permissions::new().with(PermissionScope::Contents, PermissionLevel::Read);
    let mut checks = Vec::new();
    if let Some(stop_time) = &data.stop_time {
        job.steps.push(
            Step::uses("Check stop-time limit", GITHUB_SCRIPT)
                .with_id("check_stop_time")
                .with_env("GH_AW_STOP_TIME", stop_time.clone())
                .with_env("GH_AW_WORKFLOW_NAME", data.name.clone())
                .with_input("script", script_call("check_stop_time.cjs")),
        );
        checks.push("steps.check_stop_time.outputs.stop_time_ok == 'true'");
    }
    if let Some(command) = &data.command {
        job.steps.push(
            Step::uses("Check command position", GITHUB_SCRIPT)
                .with_id("check_command_position")
                .with_env("GH_AW_COMMAND", command.clone())
                .with_input("script", script_call("check_command_position.cjs")),
        );
        checks.push("steps.check_command_position.outputs.command_position_ok == 'true'");
    }
    let activated = if checks.is_empty() {
        job.steps.push(
            Step::run("Activate", "echo \"activated=true\" >> \"$GITHUB_OUTPUT\"")
                .with_id("activate"),
        );
        "${{ steps.activate.outputs.activated }}".to_string()
    } else {
        format!("${{{{ {} }}}}", checks.join(" && "))
    };
    job.outputs.insert("activated".to_string(), activated);
    job
}

fn build_activation_job(
    data: &WorkflowData,
    runs_on: &str,
    has_pre_activation: bool,
    early_jobs: &[&str],
) -> Job {
    let mut job = Job::new(ACTIVATION_JOB, runs_on);
    if has_pre_activation {
        job.add_need(PRE_ACTIVATION_JOB);
        job.condition = Some("needs.pre_activation.outputs.activated == 'true'".to_string());
    }
    for name in early_jobs {
        job.add_need(name);
    }
    job.permissions = reaction_permissions(data);
    job.steps.push(
        Step::uses("Check workflow file timestamps", GITHUB_SCRIPT)
            .with_env("GH_AW_WORKFLOW_FILE", data.workflow_filename())
            .with_input("script", script_call("check_workflow_timestamp.cjs")),
    );
    if let Some(reaction) = &data.reaction {
        job.steps.push(
            Step::uses(&format!("Add {reaction} reaction to the triggering item"), GITHUB_SCRIPT)
                .with_id("react")
                .with_env("GH_AW_REACTION", reaction.clone())
                .with_env("GH_AW_WORKFLOW_NAME", data.name.clone())
                .with_input("script", script_call("add_reaction_and_edit_comment.cjs")),
        );
        for output in ["comment_id", "comment_repo", "comment_url", "reaction_id"] {
            job.outputs.insert(
                output.to_string(),
                format!("${{{{ steps.react.outputs.{output} }}}}"),
            );
        }
    }
    job
}

/// Contents read, plus write on commentable items when reacting.
fn reaction_permissions(data: &WorkflowData) -> Permissions {
    let mut permissions =
        Permissions::new().with(PermissionScope::Contents, PermissionLevel::Read);
    if data.reaction.is_some() {
        for scope in [
            PermissionScope::Discussions,
            PermissionScope::Issues,
            PermissionScope::PullRequests,
        ] {
            permissions.set(scope, PermissionLevel::Write);
        }
    }
    permissions
}

fn build_agent_job(
    data: &WorkflowData,
    runs_on: &str,
    options: &CompileOptions,
) -> Result<Job, CompileError> {
    let mut job = Job::new(AGENT_JOB, runs_on);
    job.add_need(ACTIVATION_JOB);
    job.permissions = data.permissions.clone();
    job.timeout_minutes = Some(data.timeout_minutes.unwrap_or(options.agent_timeout_minutes));
    job.steps.push(
        Step::uses("Checkout repository", "actions/checkout@v5")
            .with_input("persist-credentials", "false"),
    );
    let Some(safe_outputs) = &data.safe_outputs else {
        return Ok(job);
    };

    let allowed: Vec<String> = safe_outputs
        .enabled_types()
        .into_iter()
        .map(|kind| kind.to_string())
        .chain(safe_outputs.jobs.keys().cloned())
        .collect();
    let allowed = serde_json::to_string(&allowed)
        .map_err(|err| CompileError::config(format!("serialize allowed safe outputs: {err}")))?;
    job.env
        .insert("GH_AW_SAFE_OUTPUTS".to_string(), AGENT_SAFE_OUTPUTS_FILE.to_string());
    job.steps.push(
        Step::uses("Collect agent output", GITHUB_SCRIPT)
            .with_id("collect_output")
            .with_env("GH_AW_ALLOWED_SAFE_OUTPUTS", allowed)
            .with_input("script", script_call("collect_ndjson_output.cjs")),
    );
    job.steps.push(
        Step::uses("Upload agent output", "actions/upload-artifact@v4")
            .with_if("always()")
            .with_input("name", AGENT_OUTPUT_ARTIFACT)
            .with_input("path", "${{ env.GH_AW_AGENT_OUTPUT }}")
            .with_input("if-no-files-found", "warn"),
    );
    job.steps.push(
        Step::uses("Upload git patch", "actions/upload-artifact@v4")
            .with_if("always() && steps.collect_output.outputs.has_patch == 'true'")
            .with_input("name", "aw.patch")
            .with_input("path", "/tmp/gh-aw/aw.patch"),
    );
    for output in ["output", "output_types", "has_patch"] {
        job.outputs.insert(
            output.to_string(),
            format!("${{{{ steps.collect_output.outputs.{output} }}}}"),
        );
    }
    Ok(job)
}

fn add_safe_output_jobs(
    graph: &mut JobGraph,
    data: &WorkflowData,
    safe_outputs: &SafeOutputsConfig,
    registry: &HandlerRegistry,
    engine: &dyn DetectionEngine,
    runs_on: &str,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    let runs_on = safe_outputs.runs_on.as_deref().unwrap_or(runs_on);
    let detection_active = threat_detection::is_active(safe_outputs);
    if detection_active {
        graph.add_job(threat_detection::build_detection_job(
            data,
            safe_outputs,
            engine,
            runs_on,
        )?)?;
    }

    let ctx = HandlerContext::for_registry(registry, safe_outputs, detection_active);

    let mut safe_output_jobs: Vec<String> = Vec::new();
    let mut own_updates: Vec<SafeOutputType> = Vec::new();
    for handler in registry.iter() {
        let kind = handler.output_type();
        let Some(step) = handler.build_step_config(data, &ctx)? else {
            debug!(output_type = %kind, "handler disabled");
            continue;
        };
        env_manifest::check_step_env(kind, &step.env)?;

        let mut job = handler_job(kind, step, safe_outputs, runs_on, options, detection_active);
        if handler.requires_temp_id_map() {
            if let Some(source) = ctx.temp_id_map.as_ref().filter(|source| source.job != job.name) {
                job.add_need(&source.job);
            }
        }
        debug!(job = %job.name, needs = ?job.needs, "handler job added");
        graph.add_job(job)?;
        safe_output_jobs.push(kind.to_string());
        if OWN_UPDATE_PATHS.contains(&kind) {
            own_updates.push(kind);
        }
    }

    for (name, config) in &safe_outputs.jobs {
        let mut job = custom_job(name, config, runs_on);
        let base = match &config.condition {
            Some(condition) => Expr::raw(condition.clone()),
            None => Expr::and([
                Expr::raw("!cancelled()"),
                expression::agent_not_skipped(),
                expression::output_name_present(name),
            ]),
        };
        let condition = if detection_active {
            base.and_also(expression::detection_succeeded())
        } else {
            base
        };
        job.condition = Some(condition.to_string());
        job.add_need(AGENT_JOB);
        if detection_active {
            job.add_need(DETECTION_JOB);
        }
        job.timeout_minutes = job
            .timeout_minutes
            .or(Some(options.safe_output_timeout_minutes));
        for (key, value) in &safe_outputs.env {
            job.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        job.env
            .entry("GH_AW_AGENT_OUTPUT".to_string())
            .or_insert_with(|| format!("{SAFE_OUTPUTS_DIR}{AGENT_OUTPUT_ARTIFACT}"));
        job.steps.insert(0, download_agent_output_step());
        debug!(job = %name, needs = ?job.needs, "safe job added");
        graph.add_job(job)?;
        safe_output_jobs.push(name.clone());
    }

    graph.add_job(build_conclusion_job(
        data,
        runs_on,
        &safe_output_jobs,
        &own_updates,
    )?)?;
    Ok(())
}

fn download_agent_output_step() -> Step {
    Step::uses("Download agent output artifact", "actions/download-artifact@v5")
        .with_input("name", AGENT_OUTPUT_ARTIFACT)
        .with_input("path", SAFE_OUTPUTS_DIR)
}

fn script_call(module: &str) -> String {
    format!("const {{ main }} = require('/tmp/gh-aw/actions/{module}');\nawait main();")
}

fn handler_job(
    kind: SafeOutputType,
    step: StepConfig,
    safe_outputs: &SafeOutputsConfig,
    runs_on: &str,
    options: &CompileOptions,
    detection_active: bool,
) -> Job {
    let mut job = Job::new(kind.as_str(), runs_on);
    job.add_need(AGENT_JOB);
    if detection_active {
        job.add_need(DETECTION_JOB);
    }
    job.condition = Some(step.condition.to_string());
    job.permissions = step.permissions;
    job.timeout_minutes = Some(options.safe_output_timeout_minutes);
    job.env = safe_outputs.env.clone();
    job.outputs = step
        .outputs
        .iter()
        .map(|(name, key)| {
            (
                name.clone(),
                format!("${{{{ steps.{}.outputs.{} }}}}", step.step_id, key),
            )
        })
        .collect();
    for need in &step.needs {
        job.add_need(need);
    }

    job.steps.push(download_agent_output_step());
    job.steps.extend(step.pre_steps);
    job.steps.push(Step {
        name: Some(step.step_name),
        id: Some(step.step_id),
        uses: Some(GITHUB_SCRIPT.to_string()),
        with: BTreeMap::from([
            ("github-token".to_string(), step.token),
            ("script".to_string(), script_call(&step.script)),
        ]),
        env: step.env,
        ..Step::default()
    });
    job.steps.extend(step.post_steps);
    job
}

fn build_conclusion_job(
    data: &WorkflowData,
    runs_on: &str,
    safe_output_jobs: &[String],
    own_updates: &[SafeOutputType],
) -> Result<Job, CompileError> {
    let mut job = Job::new(CONCLUSION_JOB, runs_on);
    job.add_need(AGENT_JOB);
    job.add_need(ACTIVATION_JOB);
    for name in safe_output_jobs {
        job.add_need(name);
    }
    job.condition = Some(expression::conclusion_condition(own_updates).to_string());
    job.permissions = reaction_permissions(data);

    let results: BTreeMap<&str, String> = safe_output_jobs
        .iter()
        .map(|name| (name.as_str(), format!("${{{{ needs.{name}.result }}}}")))
        .collect();
    let results = serde_json::to_string(&results)
        .map_err(|err| CompileError::config(format!("serialize job results: {err}")))?;

    job.steps.push(download_agent_output_step());
    job.steps.push(
        Step::uses("Summarize safe output results", GITHUB_SCRIPT)
            .with_env("GH_AW_WORKFLOW_NAME", data.name.clone())
            .with_env("GH_AW_AGENT_CONCLUSION", "${{ needs.agent.result }}")
            .with_env("GH_AW_SAFE_OUTPUT_RESULTS", results)
            .with_input("script", script_call("summarize_results.cjs")),
    );
    if data.reaction.is_some() {
        job.steps.push(
            Step::uses("Update reaction comment with completion status", GITHUB_SCRIPT)
                .with_if("needs.activation.outputs.comment_id != ''")
                .with_env("GH_AW_COMMENT_ID", "${{ needs.activation.outputs.comment_id }}")
                .with_env(
                    "GH_AW_COMMENT_REPO",
                    "${{ needs.activation.outputs.comment_repo }}",
                )
                .with_env(
                    "GH_AW_RUN_URL",
                    "${{ github.server_url }}/${{ github.repository }}/actions/runs/${{ github.run_id }}",
                )
                .with_env("GH_AW_WORKFLOW_NAME", data.name.clone())
                .with_env("GH_AW_AGENT_CONCLUSION", "${{ needs.agent.result }}")
                .with_input("script", script_call("notify_comment.cjs")),
        );
    }
    Ok(job)
}

/// Add `needs` edges for `needs.<job>.` references to custom jobs.
fn wire_references(graph: &mut JobGraph, custom_names: &BTreeSet<String>) {
    let names: Vec<String> = graph
        .names()
        .filter(|name| !BUILTIN_JOBS.contains(name))
        .map(str::to_string)
        .collect();
    for name in names {
        let Some(job) = graph.get(&name) else {
            continue;
        };
        let found = referenced_jobs(job.texts(), custom_names, &name);
        if found.is_empty() {
            continue;
        }
        if let Some(job) = graph.get_mut(&name) {
            for dependency in &found {
                job.add_need(dependency);
            }
        }
        debug!(job = %name, references = ?found, "wired job references");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::handlers::{AddCommentHandler, FALLBACK_TOKEN, NoopHandler};
    use crate::test_support::{custom_job_with_step, detection_engine, safe_outputs_with, workflow};
    use crate::workflow::{
        Enablement, GithubToolConfig, OutputTypeConfig, ThreatDetectionConfig,
        ThreatDetectionSetting,
    };

    fn compile_default(data: &WorkflowData) -> Result<CompiledWorkflow, CompileError> {
        compile(
        data,
        &HandlerRegistry::with_defaults(),
        &detection_engine(),
        &CompileOptions::default(),
    )
    }

    fn needs(compiled: &CompiledWorkflow, job: &str) -> Vec<String> {
        compiled.graph.get(job).expect("job exists").needs.clone()
    }

    #[test]
    fn minimal_workflow_has_activation_and_agent() {
        let compiled = compile_default(&workflow("w")).expect("compile");
        let names: Vec<&str> = compiled.graph.names().collect();
        assert_eq!(names, vec!["activation", "agent"]);
        assert_eq!(needs(&compiled, "agent"), vec!["activation"]);
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn empty_name_is_a_configuration_error() {
        let err = compile_default(&workflow("  ")).expect_err("empty name");
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn handler_jobs_need_agent_and_detection() {
        let mut data = workflow("w");
        data.safe_outputs = Some(safe_outputs_with(&[
            SafeOutputType::CreateIssue,
            SafeOutputType::Noop,
        ]));
        let compiled = compile_default(&data).expect("compile");
        let names: Vec<&str> = compiled.graph.names().collect();
        assert_eq!(
            names,
            vec!["activation", "agent", "detection", "create_issue", "noop", "conclusion"]
        );
        assert_eq!(needs(&compiled, "create_issue"), vec!["agent", "detection"]);
        let job = compiled.graph.get("create_issue").expect("job");
        assert_eq!(job.timeout_minutes, Some(10));
        assert!(job
            .condition
            .as_deref()
            .expect("condition")
            .ends_with("needs.detection.outputs.success == 'true'"));
        let handler_step = job
            .steps
            .iter()
            .find(|s| s.id.as_deref() == Some("create_issue"))
            .expect("step");
        assert_eq!(handler_step.with["github-token"], FALLBACK_TOKEN);
        assert_eq!(
            job.outputs["issue_number"],
            "${{ steps.create_issue.outputs.issue_number }}"
        );
    }

    #[test]
    fn partial_registry_omits_unhandled_types() {
        let mut data = workflow("w");
        data.safe_outputs = Some(safe_outputs_with(&[
            SafeOutputType::CreateIssue,
            SafeOutputType::AddComment,
        ]));
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(AddCommentHandler)).expect("register");
        registry.register(Box::new(NoopHandler)).expect("register");

        let compiled = compile(
            &data,
            &registry,
            &detection_engine(),
            &CompileOptions::default(),
        )
        .expect("compile");
        assert!(compiled.graph.get("create_issue").is_none());
        assert_eq!(needs(&compiled, "add_comment"), vec!["agent", "detection"]);
    }

    #[test]
    fn temporary_id_map_adds_producer_edge() {
        let mut data = workflow("w");
        let mut outputs = SafeOutputsConfig::default();
        let one = OutputTypeConfig {
            max: Some(1),
            ..OutputTypeConfig::default()
        };
        outputs.create_issue = Enablement::Enabled(one.clone());
        outputs.create_discussion = Enablement::Enabled(one);
        data.safe_outputs = Some(outputs);
        let compiled = compile_default(&data).expect("compile");
        assert_eq!(
            needs(&compiled, "create_discussion"),
            vec!["agent", "detection", "create_issue"]
        );
        let job = compiled.graph.get("create_discussion").expect("job");
        let env = &job
            .steps
            .iter()
            .find(|s| s.id.as_deref() == Some("create_discussion"))
            .expect("step")
            .env;
        assert_eq!(
            env["GH_AW_TEMPORARY_ID_MAP"],
            "${{ needs.create_issue.outputs.temporary_id_map }}"
        );
    }

    #[test]
    fn no_temp_id_edge_without_producer() {
        let mut data = workflow("w");
        data.safe_outputs = Some(safe_outputs_with(&[SafeOutputType::CreateDiscussion]));
        let compiled = compile_default(&data).expect("compile");
        assert_eq!(needs(&compiled, "create_discussion"), vec!["agent", "detection"]);
    }

    #[test]
    fn safe_job_gets_detection_by_default() {
        let mut data = workflow("w");
        let mut outputs = SafeOutputsConfig::default();
        outputs
            .jobs
            .insert("custom".to_string(), custom_job_with_step("echo hi"));
        data.safe_outputs = Some(outputs);
        let compiled = compile_default(&data).expect("compile");
        assert!(compiled.graph.contains("detection"));
        let custom = needs(&compiled, "custom");
        assert!(custom.contains(&"agent".to_string()));
        assert!(custom.contains(&"detection".to_string()));
    }

    #[test]
    fn safe_job_without_detection_when_disabled() {
        let mut data = workflow("w");
        let mut outputs = SafeOutputsConfig::default();
        outputs
            .jobs
            .insert("custom".to_string(), custom_job_with_step("echo hi"));
        outputs.threat_detection = Some(ThreatDetectionSetting::Config(ThreatDetectionConfig {
            enabled: Some(false),
            ..ThreatDetectionConfig::default()
        }));
        data.safe_outputs = Some(outputs);
        let compiled = compile_default(&data).expect("compile");
        assert!(!compiled.graph.contains("detection"));
        assert_eq!(needs(&compiled, "custom"), vec!["agent"]);
    }

    #[test]
    fn mutually_referencing_jobs_fail_with_both_named() {
        let mut data = workflow("w");
        data.jobs
            .insert("x".to_string(), custom_job_with_step("echo ${{ needs.y.outputs.v }}"));
        data.jobs
            .insert("y".to_string(), custom_job_with_step("echo ${{ needs.x.outputs.v }}"));
        let err = compile_default(&data).expect_err("cycle");
        assert_eq!(err.kind(), ErrorKind::GraphIntegrityError);
        let message = err.to_string();
        assert!(message.contains("'x'") && message.contains("'y'"), "{message}");
    }

    #[test]
    fn pre_activation_custom_job_runs_before_activation() {
        let mut data = workflow("w");
        let mut gate = custom_job_with_step("./gate.sh");
        gate.needs = vec!["pre_activation".to_string()];
        data.jobs.insert("gate".to_string(), gate);
        data.jobs
            .insert("report".to_string(), custom_job_with_step("./report.sh"));
        let compiled = compile_default(&data).expect("compile");
        assert!(compiled.graph.contains("pre_activation"));
        assert_eq!(needs(&compiled, "gate"), vec!["pre_activation"]);
        assert_eq!(needs(&compiled, "activation"), vec!["pre_activation", "gate"]);
        assert_eq!(needs(&compiled, "report"), vec!["agent"]);
    }

    #[test]
    fn handler_referencing_custom_job_depends_on_it() {
        let mut data = workflow("w");
        data.jobs
            .insert("build".to_string(), custom_job_with_step("make"));
        let mut outputs = safe_outputs_with(&[SafeOutputType::Noop]);
        outputs.env.insert(
            "ARTIFACT".to_string(),
            "${{ needs.build.outputs.artifact }}".to_string(),
        );
        data.safe_outputs = Some(outputs);
        let compiled = compile_default(&data).expect("compile");
        assert_eq!(needs(&compiled, "noop"), vec!["agent", "detection", "build"]);
    }

    #[test]
    fn conclusion_depends_on_every_safe_output_job() {
        let mut data = workflow("w");
        let mut outputs = safe_outputs_with(&[SafeOutputType::AddComment]);
        outputs
            .jobs
            .insert("notify".to_string(), custom_job_with_step("./notify.sh"));
        data.safe_outputs = Some(outputs);
        let compiled = compile_default(&data).expect("compile");
        assert_eq!(
            needs(&compiled, "conclusion"),
            vec!["agent", "activation", "add_comment", "notify"]
        );
        let condition = compiled
            .graph
            .get("conclusion")
            .and_then(|job| job.condition.clone())
            .expect("condition");
        assert!(condition.starts_with("always() && needs.agent.result != 'skipped'"));
        assert!(condition.contains("!(contains(needs.agent.outputs.output_types, 'add_comment'))"));
    }

    #[test]
    fn missing_permissions_abort_with_fix() {
        let mut data = workflow("w");
        data.github_tool = Some(GithubToolConfig {
            toolsets: vec!["issues".to_string()],
            read_only: true,
        });
        let err = compile_default(&data).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::PermissionError);
        assert!(err.to_string().contains("permissions:\n  issues: read"));
    }

    #[test]
    fn excess_permissions_warn_unless_strict() {
        let mut data = workflow("w");
        data.github_tool = Some(GithubToolConfig {
            toolsets: vec!["issues".to_string()],
            read_only: false,
        });
        data.permissions = Permissions::new()
            .with(PermissionScope::Issues, PermissionLevel::Write)
            .with(PermissionScope::Contents, PermissionLevel::Write);
        let compiled = compile_default(&data).expect("compile");
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].starts_with("WARNING"));

        data.strict = true;
        let err = compile_default(&data).expect_err("strict");
        assert!(err.to_string().starts_with("ERROR: Over-provisioned"));
    }

    #[test]
    fn reserved_and_empty_custom_jobs_are_rejected() {
        let mut data = workflow("w");
        data.jobs
            .insert("agent".to_string(), custom_job_with_step("echo"));
        assert!(compile_default(&data)
            .expect_err("reserved")
            .to_string()
            .contains("reserved"));

        let mut data = workflow("w");
        data.jobs.insert("empty".to_string(), CustomJobConfig::default());
        assert_eq!(
            compile_default(&data).expect_err("empty").to_string(),
            "configuration error: job 'empty' has no steps"
        );
    }

    #[test]
    fn duplicate_custom_job_names_collide() {
        let mut data = workflow("w");
        data.jobs
            .insert("notify".to_string(), custom_job_with_step("echo"));
        let mut outputs = SafeOutputsConfig::default();
        outputs
            .jobs
            .insert("notify".to_string(), custom_job_with_step("echo"));
        data.safe_outputs = Some(outputs);
        let err = compile_default(&data).expect_err("duplicate");
        assert_eq!(
            err.to_string(),
            "job graph integrity error: job 'notify' already exists"
        );
    }

    #[test]
    fn command_and_reaction_shape_activation() {
        let mut data = workflow("w");
        data.command = Some("triage".to_string());
        data.reaction = Some("eyes".to_string());
        let compiled = compile_default(&data).expect("compile");
        let activation = compiled.graph.get("activation").expect("activation");
        assert_eq!(activation.needs, vec!["pre_activation"]);
        assert!(activation.outputs.contains_key("comment_id"));
        assert_eq!(
            activation.permissions.get(PermissionScope::Issues),
            PermissionLevel::Write
        );
    }
}
