//! Handlers that touch pull requests or push code.

use std::collections::BTreeMap;

use super::{
    AGENT_OUTPUT_PATH, HandlerContext, SafeOutputHandler, StepConfig, base_step, checkout_step,
    outputs, permissions, targets_triggering,
};
use crate::core::error::CompileError;
use crate::core::expression;
use crate::core::permissions::{PermissionLevel as L, PermissionScope as S, Permissions};
use crate::core::types::SafeOutputType;
use crate::job::ACTIVATION_JOB;
use crate::workflow::{SafeOutputsConfig, WorkflowData};

const DEFAULT_MAX_PATCH_SIZE_KB: u32 = 1024;

fn max_patch_size(safe_outputs: &SafeOutputsConfig) -> u32 {
    safe_outputs
        .max_patch_size
        .unwrap_or(DEFAULT_MAX_PATCH_SIZE_KB)
}

pub struct CreatePullRequestHandler;

impl SafeOutputHandler for CreatePullRequestHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreatePullRequest
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_pull_request.config() else {
            return Ok(None);
        };
        if let Some(mode) = config.if_no_changes.as_deref() {
            if !matches!(mode, "warn" | "error" | "ignore") {
                return Err(CompileError::config(format!(
                    "if-no-changes must be 'warn', 'error', or 'ignore' (got '{mode}') for create_pull_request"
                )));
            }
        }
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_WORKFLOW_ID", data.workflow_id());
        step.set_env("GH_AW_BASE_BRANCH", "${{ github.ref_name }}");
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_PR_TITLE_PREFIX", config.title_prefix.as_deref());
        step.set_env_list("GH_AW_PR_LABELS", &config.labels);
        step.set_env_list("GH_AW_PR_ALLOWED_LABELS", &config.allowed);
        step.set_env("GH_AW_PR_DRAFT", config.draft.unwrap_or(true).to_string());
        step.set_env(
            "GH_AW_PR_IF_NO_CHANGES",
            config.if_no_changes.as_deref().unwrap_or("warn"),
        );
        step.set_env_opt("GH_AW_PR_ALLOW_EMPTY", config.allow_empty);
        step.set_env(
            "GH_AW_MAX_PATCH_SIZE",
            max_patch_size(ctx.safe_outputs).to_string(),
        );
        if data.reaction.is_some() {
            step.set_env(
                "GH_AW_COMMENT_ID",
                "${{ needs.activation.outputs.comment_id }}",
            );
            step.set_env(
                "GH_AW_COMMENT_REPO",
                "${{ needs.activation.outputs.comment_repo }}",
            );
        }
        step.needs.insert(ACTIVATION_JOB.to_string());
        step.pre_steps.push(checkout_step(&step.token));
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[
            ("branch_name", "branch_name"),
            ("pull_request_number", "pull_request_number"),
            ("pull_request_url", "pull_request_url"),
        ])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[
            (S::Contents, L::Write),
            (S::Issues, L::Write),
            (S::PullRequests, L::Write),
        ])
    }
}

pub struct PushToPullRequestBranchHandler;

impl SafeOutputHandler for PushToPullRequestBranchHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::PushToPullRequestBranch
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.push_to_pull_request_branch.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env(
            "GH_AW_PUSH_TARGET",
            config
                .target
                .map(|target| target.to_string())
                .unwrap_or_else(|| "triggering".to_string()),
        );
        step.set_env_opt("GH_AW_PR_TITLE_PREFIX", config.title_prefix.as_deref());
        step.set_env_list("GH_AW_PR_LABELS", &config.labels);
        step.set_env_opt(
            "GH_AW_COMMIT_TITLE_SUFFIX",
            config.commit_title_suffix.as_deref(),
        );
        step.set_env(
            "GH_AW_PUSH_IF_NO_CHANGES",
            config.if_no_changes.as_deref().unwrap_or("warn"),
        );
        step.set_env(
            "GH_AW_MAX_PATCH_SIZE",
            max_patch_size(ctx.safe_outputs).to_string(),
        );
        if targets_triggering(config) {
            step.gate(expression::triggered_by_pr());
        }
        step.needs.insert(ACTIVATION_JOB.to_string());
        step.pre_steps.push(checkout_step(&step.token));
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[
            ("branch_name", "branch_name"),
            ("commit_sha", "commit_sha"),
            ("push_url", "push_url"),
        ])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[
            (S::Contents, L::Write),
            (S::Issues, L::Read),
            (S::PullRequests, L::Read),
        ])
    }
}

pub struct CreatePrReviewCommentHandler;

impl SafeOutputHandler for CreatePrReviewCommentHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreatePrReviewComment
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_pr_review_comment.config() else {
            return Ok(None);
        };
        if let Some(side) = config.side.as_deref() {
            if !matches!(side, "LEFT" | "RIGHT") {
                return Err(CompileError::config(format!(
                    "side must be 'LEFT' or 'RIGHT' (got '{side}') for create_pr_review_comment"
                )));
            }
        }
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_PR_REVIEW_COMMENT_TARGET", config.target);
        step.set_env_opt("GH_AW_PR_REVIEW_COMMENT_SIDE", config.side.as_deref());
        if targets_triggering(config) {
            step.gate(expression::triggered_by_pr());
        }
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[
            ("review_comment_id", "review_comment_id"),
            ("review_comment_url", "review_comment_url"),
        ])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read), (S::PullRequests, L::Write)])
    }
}
