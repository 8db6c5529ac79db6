//! Threat detection gate.
//!
//! When active, a single read-only `detection` job runs after the agent and
//! inspects its output (by file path) for prompt injection, leaked secrets,
//! and malicious patches. It exposes a `success` output; every safe-output
//! job requires `success == 'true'` before touching GitHub.

use minijinja::{Environment, context};
use tracing::debug;

use crate::core::error::CompileError;
use crate::core::handlers::AGENT_OUTPUT_ARTIFACT;
use crate::core::permissions::{PermissionLevel, PermissionScope, Permissions};
use crate::job::{AGENT_JOB, DETECTION_JOB, Job, Step};
use crate::workflow::{SafeOutputsConfig, WorkflowData};

const PROMPT_TEMPLATE: &str = include_str!("prompts/threat_detection.md");

pub const DETECTION_DIR: &str = "/tmp/gh-aw/threat-detection";
pub const DETECTION_TIMEOUT_MINUTES: u32 = 10;
pub const DEFAULT_DETECTION_COMMAND: &str = "claude --print";
const PROMPT_PATH: &str = "/tmp/gh-aw/threat-detection/prompts/detection.md";
const RESULT_PATH: &str = "/tmp/gh-aw/threat-detection/detection.log";
const PATCH_ARTIFACT: &str = "aw.patch";

/// Runs an AI engine over the rendered detection prompt.
///
/// Engine CLIs live outside the compiler. An implementation returns the
/// steps that invoke one; they read the prompt path from `$GH_AW_PROMPT`
/// and must write the engine transcript to `log_path`, where the verdict
/// parser looks for the `THREAT_DETECTION_RESULT:` line.
pub trait DetectionEngine {
    fn id(&self) -> &str;

    fn steps(&self, log_path: &str) -> Vec<Step>;
}

/// Engine invoked by one shell command taking the prompt as its last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEngine {
    command: String,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DetectionEngine for CommandEngine {
    fn id(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }

    fn steps(&self, log_path: &str) -> Vec<Step> {
        let script = format!(
            "{} \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee {log_path}",
            self.command.trim()
        );
        vec![
            Step::run("Execute threat detection", &script)
                .with_id("detection_engine")
                .with_env("GH_AW_ENGINE_ID", self.id().to_string()),
        ]
    }
}

/// Whether the detection job is part of the graph.
///
/// An explicit `threat-detection` setting wins. Otherwise detection is on
/// whenever a custom safe-output job or any output type is configured.
pub fn is_active(safe_outputs: &SafeOutputsConfig) -> bool {
    match &safe_outputs.threat_detection {
        Some(setting) => setting.enabled(),
        None => !safe_outputs.jobs.is_empty() || !safe_outputs.enabled_types().is_empty(),
    }
}

/// Render the built-in detection prompt.
pub fn render_default_prompt(workflow_name: &str) -> Result<String, CompileError> {
    let mut env = Environment::new();
    env.add_template("threat_detection", PROMPT_TEMPLATE)
        .map_err(|err| CompileError::config(format!("load threat detection prompt: {err}")))?;
    let template = env
        .get_template("threat_detection")
        .map_err(|err| CompileError::config(format!("load threat detection prompt: {err}")))?;
    template
        .render(context! {
            workflow_name => workflow_name,
            agent_output_path => format!("{DETECTION_DIR}/{AGENT_OUTPUT_ARTIFACT}"),
            agent_patch_path => format!("{DETECTION_DIR}/{PATCH_ARTIFACT}"),
        })
        .map_err(|err| CompileError::config(format!("render threat detection prompt: {err}")))
}

fn is_url(prompt: &str) -> bool {
    prompt.starts_with("https://") || prompt.starts_with("http://")
}

fn setup_script(data: &WorkflowData, custom_prompt: Option<&str>) -> Result<String, CompileError> {
    let mut lines = vec![format!("mkdir -p {DETECTION_DIR}/prompts")];
    match custom_prompt {
        Some(prompt) if is_url(prompt) => {
            lines.push(format!("curl -sSfL -o {PROMPT_PATH} \"{prompt}\""));
        }
        Some(prompt) => {
            lines.push(format!("cp \"{prompt}\" {PROMPT_PATH}"));
        }
        None => {
            lines.push(format!("cat > {PROMPT_PATH} << 'THREAT_DETECTION_EOF'"));
            lines.push(render_default_prompt(&data.name)?);
            lines.push("THREAT_DETECTION_EOF".to_string());
        }
    }
    lines.push(format!("echo \"GH_AW_PROMPT={PROMPT_PATH}\" >> \"$GITHUB_ENV\""));
    Ok(lines.join("\n"))
}

fn parse_results_script() -> String {
    [
        format!("verdict=$(grep -o 'THREAT_DETECTION_RESULT:.*' \"{RESULT_PATH}\" 2>/dev/null | tail -n 1 | cut -d: -f2- || true)"),
        "if [ -n \"$verdict\" ] && echo \"$verdict\" | jq -e '(.prompt_injection or .secret_leak or .malicious_patch) | not' > /dev/null; then".to_string(),
        "  echo \"success=true\" >> \"$GITHUB_OUTPUT\"".to_string(),
        "else".to_string(),
        "  echo \"::error::Threat detection blocked safe outputs: $verdict\"".to_string(),
        "  echo \"success=false\" >> \"$GITHUB_OUTPUT\"".to_string(),
        "fi".to_string(),
    ]
    .join("\n")
}

/// Build the `detection` job (needs `agent`, read-only).
pub fn build_detection_job(
    data: &WorkflowData,
    safe_outputs: &SafeOutputsConfig,
    engine: &dyn DetectionEngine,
    runs_on: &str,
) -> Result<Job, CompileError> {
    let config = safe_outputs
        .threat_detection
        .as_ref()
        .and_then(|setting| setting.config());
    let custom_prompt = config
        .and_then(|config| config.prompt.as_deref())
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty());
    debug!(custom_prompt = ?custom_prompt, engine = engine.id(), "building threat detection job");

    let mut job = Job::new(DETECTION_JOB, runs_on);
    job.add_need(AGENT_JOB);
    job.timeout_minutes = Some(DETECTION_TIMEOUT_MINUTES);
    job.permissions = Permissions::new().with(PermissionScope::Contents, PermissionLevel::Read);
    job.outputs.insert(
        "success".to_string(),
        "${{ steps.parse_results.outputs.success }}".to_string(),
    );

    if matches!(custom_prompt, Some(prompt) if !is_url(prompt)) {
        job.steps.push(
            Step::uses("Checkout repository", "actions/checkout@v5")
                .with_input("persist-credentials", "false"),
        );
    }
    job.steps.push(
        Step::uses("Download agent output artifact", "actions/download-artifact@v5")
            .with_input("name", AGENT_OUTPUT_ARTIFACT)
            .with_input("path", format!("{DETECTION_DIR}/")),
    );
    job.steps.push(
        Step::uses("Download patch artifact", "actions/download-artifact@v5")
            .with_if("needs.agent.outputs.has_patch == 'true'")
            .with_input("name", PATCH_ARTIFACT)
            .with_input("path", format!("{DETECTION_DIR}/")),
    );
    job.steps.push(
        Step::run(
            "Setup threat detection",
            &setup_script(data, custom_prompt)?,
        )
        .with_env("GH_AW_WORKFLOW_NAME", data.name.clone()),
    );
    job.steps.extend(engine.steps(RESULT_PATH));
    if let Some(config) = config {
        job.steps.extend(config.steps.iter().cloned());
    }
    job.steps.push(
        Step::run("Parse threat detection results", &parse_results_script())
            .with_id("parse_results"),
    );
    job.steps.push(
        Step::uses("Upload threat detection log", "actions/upload-artifact@v4")
            .with_if("always()")
            .with_input("name", "threat-detection.log")
            .with_input("path", RESULT_PATH)
            .with_input("if-no-files-found", "ignore"),
    );
    Ok(job)
}
