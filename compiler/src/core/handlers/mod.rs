//! Safe-output handlers and their registry.
//!
//! One handler per [`SafeOutputType`]. A handler turns its slice of the
//! safe-outputs config into a [`StepConfig`]: the env its script reads, the
//! token it runs with, its `if:` gate, its outputs, and the least permissions
//! the side effect needs. A handler for a type that is not enabled returns
//! `Ok(None)` and no job is emitted.

mod issues;
mod pull_requests;
mod reports;
mod token;

use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::CompileError;
use crate::core::expression::{self, Expr};
use crate::core::permissions::{PermissionLevel, PermissionScope, Permissions};
use crate::core::types::SafeOutputType;
use crate::job::Step;
use crate::workflow::{OutputTypeConfig, SafeOutputsConfig, Target, WorkflowData};

pub use issues::{AddCommentHandler, AddLabelsHandler, CreateDiscussionHandler, CreateIssueHandler};
pub use pull_requests::{
    CreatePrReviewCommentHandler, CreatePullRequestHandler, PushToPullRequestBranchHandler,
};
pub use reports::{
    CreateAgentTaskHandler, CreateCodeScanningAlertHandler, MissingToolHandler, NoopHandler,
};
pub use token::{APP_TOKEN, FALLBACK_TOKEN, effective_token};

/// Where safe-output jobs find the agent output file.
pub const AGENT_OUTPUT_PATH: &str = "/tmp/gh-aw/safe-outputs/agent_output.json";
pub const AGENT_OUTPUT_ARTIFACT: &str = "agent_output.json";
pub const TEMPORARY_ID_MAP_OUTPUT: &str = "temporary_id_map";

/// A job output another job can read (`needs.<job>.outputs.<output>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub job: String,
    pub output: String,
}

impl OutputRef {
    pub fn expression(&self) -> String {
        format!("${{{{ needs.{}.outputs.{} }}}}", self.job, self.output)
    }
}

/// Compile-time facts a handler may consult.
#[derive(Debug, Clone)]
pub struct HandlerContext<'a> {
    pub safe_outputs: &'a SafeOutputsConfig,
    pub detection_active: bool,
    /// Producer of the temporary-ID map, when one is enabled.
    pub temp_id_map: Option<OutputRef>,
    pub enabled: BTreeSet<SafeOutputType>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(safe_outputs: &'a SafeOutputsConfig, detection_active: bool) -> Self {
        Self {
            safe_outputs,
            detection_active,
            temp_id_map: None,
            enabled: safe_outputs.enabled_types().into_iter().collect(),
        }
    }

    /// Context limited to what `registry` can emit: a configured type with
    /// no registered handler is neither enabled nor a temp-ID producer.
    pub fn for_registry(
        registry: &HandlerRegistry,
        safe_outputs: &'a SafeOutputsConfig,
        detection_active: bool,
    ) -> Self {
        let enabled: BTreeSet<SafeOutputType> = registry
            .iter()
            .filter(|handler| handler.is_enabled(safe_outputs))
            .map(|handler| handler.output_type())
            .collect();
        let temp_id_map = registry
            .iter()
            .find(|handler| handler.provides_temp_id_map() && handler.is_enabled(safe_outputs))
            .map(|handler| OutputRef {
                job: handler.output_type().to_string(),
                output: TEMPORARY_ID_MAP_OUTPUT.to_string(),
            });
        Self {
            safe_outputs,
            detection_active,
            temp_id_map,
            enabled,
        }
    }
}

/// Everything needed to emit one handler job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfig {
    pub step_name: String,
    pub step_id: String,
    /// Script module the step runs.
    pub script: String,
    pub env: BTreeMap<String, String>,
    pub condition: Expr,
    /// Job output name -> step output key.
    pub outputs: BTreeMap<String, String>,
    pub token: String,
    pub permissions: Permissions,
    /// Jobs whose outputs the step reads.
    pub needs: BTreeSet<String>,
    /// Steps before the handler step (checkout, token mint).
    pub pre_steps: Vec<Step>,
    /// Steps after the handler step.
    pub post_steps: Vec<Step>,
}

impl StepConfig {
    pub fn set_env(&mut self, key: &str, value: impl Into<String>) {
        self.env.insert(key.to_string(), value.into());
    }

    pub fn set_env_opt(&mut self, key: &str, value: Option<impl ToString>) {
        if let Some(value) = value {
            self.env.insert(key.to_string(), value.to_string());
        }
    }

    pub fn set_env_list(&mut self, key: &str, values: &[String]) {
        if !values.is_empty() {
            self.env.insert(key.to_string(), values.join(","));
        }
    }

    pub fn gate(&mut self, extra: Expr) {
        self.condition = Expr::and([self.condition.clone(), extra]);
    }

    /// Read another job's output into `key` and depend on that job.
    pub fn read_output(&mut self, key: &str, source: &OutputRef) {
        self.set_env(key, source.expression());
        self.needs.insert(source.job.clone());
    }
}

pub trait SafeOutputHandler {
    fn output_type(&self) -> SafeOutputType;

    fn is_enabled(&self, config: &SafeOutputsConfig) -> bool {
        config.get(self.output_type()).is_enabled()
    }

    /// Build the step for this type, or `None` when it is not enabled.
    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError>;

    /// Job output name -> step output key.
    fn outputs(&self) -> BTreeMap<String, String>;

    fn requires_temp_id_map(&self) -> bool {
        false
    }

    fn provides_temp_id_map(&self) -> bool {
        false
    }

    /// Least permissions the side effect needs.
    fn permissions(&self) -> Permissions;
}

/// Ordered set of handlers, one per output type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn SafeOutputHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every output type.
    ///
    /// `create_issue` comes first so its temporary-ID map is known before
    /// the handlers that consume it.
    pub fn with_defaults() -> Self {
        let handlers: Vec<Box<dyn SafeOutputHandler>> = vec![
            Box::new(CreateIssueHandler),
            Box::new(CreateDiscussionHandler),
            Box::new(AddCommentHandler),
            Box::new(CreatePullRequestHandler),
            Box::new(CreatePrReviewCommentHandler),
            Box::new(CreateCodeScanningAlertHandler),
            Box::new(AddLabelsHandler),
            Box::new(PushToPullRequestBranchHandler),
            Box::new(CreateAgentTaskHandler),
            Box::new(MissingToolHandler),
            Box::new(NoopHandler),
        ];
        Self { handlers }
    }

    pub fn register(&mut self, handler: Box<dyn SafeOutputHandler>) -> Result<(), CompileError> {
        let kind = handler.output_type();
        if self.get(kind).is_some() {
            return Err(CompileError::config(format!(
                "handler for '{kind}' is already registered"
            )));
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn get(&self, kind: SafeOutputType) -> Option<&dyn SafeOutputHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.output_type() == kind)
            .map(|handler| handler.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SafeOutputHandler> {
        self.handlers.iter().map(|handler| handler.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Reject contradictory or out-of-range settings for one type.
fn check_config(kind: SafeOutputType, config: &OutputTypeConfig) -> Result<(), CompileError> {
    if let Some(repo) = config.target_repo.as_deref() {
        if repo.trim() == "*" {
            return Err(CompileError::config(format!(
                "target-repo '*' is not allowed for {kind}"
            )));
        }
        if config.target == Some(Target::Triggering) {
            return Err(CompileError::config(format!(
                "target-repo cannot be combined with target 'triggering' for {kind}"
            )));
        }
    }
    if config.max == Some(0) {
        return Err(CompileError::config(format!(
            "max must be greater than 0 for {kind}"
        )));
    }
    if let (Some(min), Some(max)) = (config.min, config.max) {
        if min > max {
            return Err(CompileError::config(format!(
                "min ({min}) cannot exceed max ({max}) for {kind}"
            )));
        }
    }
    Ok(())
}

/// Shared part of every handler step: common env, token, base gate.
fn base_step(
    handler: &dyn SafeOutputHandler,
    config: &OutputTypeConfig,
    data: &WorkflowData,
    ctx: &HandlerContext<'_>,
) -> Result<StepConfig, CompileError> {
    let kind = handler.output_type();
    check_config(kind, config)?;

    let token = token::handler_token(config, data, ctx.safe_outputs);
    let mut condition = expression::safe_output_condition(kind, config.min.unwrap_or(0));
    if ctx.detection_active {
        condition = condition.and_also(expression::detection_succeeded());
    }

    let mut step = StepConfig {
        step_name: step_title(kind),
        step_id: kind.as_str().to_string(),
        script: format!("{kind}.cjs"),
        env: BTreeMap::new(),
        condition,
        outputs: handler.outputs(),
        token: token.clone(),
        permissions: handler.permissions(),
        needs: BTreeSet::new(),
        pre_steps: Vec::new(),
        post_steps: Vec::new(),
    };

    step.set_env("GH_AW_WORKFLOW_NAME", data.name.clone());
    step.set_env("GITHUB_TOKEN", token);
    step.set_env_opt("GH_AW_WORKFLOW_SOURCE", data.source.as_deref());
    step.set_env_opt("GH_AW_TRACKER_ID", data.tracker_id.as_deref());
    step.set_env_opt("GH_AW_ENGINE_ID", data.engine.as_deref());
    if config.staged.unwrap_or(ctx.safe_outputs.staged) {
        step.set_env("GH_AW_SAFE_OUTPUTS_STAGED", "true");
    }
    step.set_env_opt("GH_AW_TARGET_REPO_SLUG", config.target_repo.as_deref());
    step.set_env_opt("GH_AW_SAFE_OUTPUT_MAX", config.max);
    step.set_env_opt("GH_AW_SAFE_OUTPUT_MIN", config.min);

    if let Some(app) = ctx.safe_outputs.app.as_ref() {
        if step.token == APP_TOKEN {
            step.pre_steps.push(token::mint_app_token_step(app, &step.permissions));
            step.post_steps.push(token::invalidate_app_token_step());
        }
    }
    Ok(step)
}

/// Gate on the triggering issue/PR unless an explicit target is configured.
fn targets_triggering(config: &OutputTypeConfig) -> bool {
    matches!(config.target, None | Some(Target::Triggering))
}

fn step_title(kind: SafeOutputType) -> String {
    let words: Vec<String> = kind
        .as_str()
        .split('_')
        .map(|word| match word {
            "pr" => "PR".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect();
    words.join(" ")
}

fn checkout_step(token: &str) -> Step {
    Step::uses("Checkout repository", "actions/checkout@v5")
        .with_input("token", token)
        .with_input("persist-credentials", "false")
}

fn outputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, key)| (name.to_string(), key.to_string()))
        .collect()
}

fn permissions(pairs: &[(PermissionScope, PermissionLevel)]) -> Permissions {
    pairs.iter().copied().collect()
}
