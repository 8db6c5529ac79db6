//! Issue, discussion, comment, and label handlers.

use std::collections::BTreeMap;

use super::{
    AGENT_OUTPUT_PATH, HandlerContext, OutputRef, SafeOutputHandler, StepConfig,
    TEMPORARY_ID_MAP_OUTPUT, base_step, outputs, permissions, targets_triggering,
};
use crate::core::error::CompileError;
use crate::core::expression;
use crate::core::permissions::{PermissionLevel as L, PermissionScope as S, Permissions};
use crate::core::types::SafeOutputType;
use crate::workflow::WorkflowData;

pub struct CreateIssueHandler;

impl SafeOutputHandler for CreateIssueHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreateIssue
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_issue.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_ISSUE_TITLE_PREFIX", config.title_prefix.as_deref());
        step.set_env_list("GH_AW_ISSUE_LABELS", &config.labels);
        step.set_env_list("GH_AW_ISSUE_ALLOWED_LABELS", &config.allowed);
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[
            ("issue_number", "issue_number"),
            ("issue_url", "issue_url"),
            (TEMPORARY_ID_MAP_OUTPUT, TEMPORARY_ID_MAP_OUTPUT),
        ])
    }

    fn provides_temp_id_map(&self) -> bool {
        true
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read), (S::Issues, L::Write)])
    }
}

pub struct CreateDiscussionHandler;

impl SafeOutputHandler for CreateDiscussionHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreateDiscussion
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_discussion.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_DISCUSSION_CATEGORY", config.category.as_deref());
        step.set_env_opt(
            "GH_AW_DISCUSSION_TITLE_PREFIX",
            config.title_prefix.as_deref(),
        );
        step.set_env_list("GH_AW_DISCUSSION_LABELS", &config.labels);
        if config.close_older_discussions == Some(true) {
            step.set_env("GH_AW_CLOSE_OLDER_DISCUSSIONS", "true");
        }
        if let Some(source) = &ctx.temp_id_map {
            step.read_output("GH_AW_TEMPORARY_ID_MAP", source);
        }
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[
            ("discussion_number", "discussion_number"),
            ("discussion_url", "discussion_url"),
        ])
    }

    fn requires_temp_id_map(&self) -> bool {
        true
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read), (S::Discussions, L::Write)])
    }
}

pub struct AddCommentHandler;

/// Outputs of sibling jobs a comment may link to.
const CREATED_ITEM_REFS: &[(SafeOutputType, &str, &str)] = &[
    (
        SafeOutputType::CreateIssue,
        "GH_AW_CREATED_ISSUE_URL",
        "issue_url",
    ),
    (
        SafeOutputType::CreateIssue,
        "GH_AW_CREATED_ISSUE_NUMBER",
        "issue_number",
    ),
    (
        SafeOutputType::CreateDiscussion,
        "GH_AW_CREATED_DISCUSSION_URL",
        "discussion_url",
    ),
    (
        SafeOutputType::CreateDiscussion,
        "GH_AW_CREATED_DISCUSSION_NUMBER",
        "discussion_number",
    ),
    (
        SafeOutputType::CreatePullRequest,
        "GH_AW_CREATED_PULL_REQUEST_URL",
        "pull_request_url",
    ),
    (
        SafeOutputType::CreatePullRequest,
        "GH_AW_CREATED_PULL_REQUEST_NUMBER",
        "pull_request_number",
    ),
];

impl SafeOutputHandler for AddCommentHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::AddComment
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.add_comment.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_COMMENT_TARGET", config.target);
        if config.discussion == Some(true) {
            step.set_env("GITHUB_AW_COMMENT_DISCUSSION", "true");
        }
        if config.hide_older_comments == Some(true) {
            step.set_env("GH_AW_HIDE_OLDER_COMMENTS", "true");
        }
        for (kind, key, output) in CREATED_ITEM_REFS {
            if ctx.enabled.contains(kind) {
                let source = OutputRef {
                    job: kind.to_string(),
                    output: output.to_string(),
                };
                step.read_output(key, &source);
            }
        }
        if let Some(source) = &ctx.temp_id_map {
            step.read_output("GH_AW_TEMPORARY_ID_MAP", source);
        }
        if targets_triggering(config) {
            step.gate(expression::triggered_by_issue_or_pr());
        }
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("comment_id", "comment_id"), ("comment_url", "comment_url")])
    }

    fn requires_temp_id_map(&self) -> bool {
        true
    }

    fn permissions(&self) -> Permissions {
        permissions(&[
            (S::Contents, L::Read),
            (S::Discussions, L::Write),
            (S::Issues, L::Write),
            (S::PullRequests, L::Write),
        ])
    }
}

pub struct AddLabelsHandler;

impl SafeOutputHandler for AddLabelsHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::AddLabels
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.add_labels.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_list("GH_AW_LABELS_ALLOWED", &config.allowed);
        step.set_env_opt("GH_AW_LABELS_TARGET", config.target);
        if targets_triggering(config) {
            step.gate(expression::triggered_by_issue_or_pr());
        }
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("labels_added", "labels_added")])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[
            (S::Contents, L::Read),
            (S::Issues, L::Write),
            (S::PullRequests, L::Write),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{safe_outputs_with, workflow};
    use crate::workflow::{Enablement, OutputTypeConfig, Target};

    #[test]
    fn create_issue_passes_labels_and_prefix() {
        let data = workflow("triage");
        let mut outputs = safe_outputs_with(&[]);
        outputs.create_issue = Enablement::Enabled(OutputTypeConfig {
            title_prefix: Some("[bot] ".to_string()),
            labels: vec!["bug".to_string(), "triage".to_string()],
            ..OutputTypeConfig::default()
        });
        let step = CreateIssueHandler
            .build_step_config(&data, &HandlerContext::new(&outputs, false))
            .expect("build")
            .expect("enabled");
        assert_eq!(step.env["GH_AW_ISSUE_TITLE_PREFIX"], "[bot] ");
        assert_eq!(step.env["GH_AW_ISSUE_LABELS"], "bug,triage");
        assert_eq!(step.env["GH_AW_WORKFLOW_NAME"], "triage");
        assert!(step.outputs.contains_key("temporary_id_map"));
        assert_eq!(step.permissions.get(S::Issues), L::Write);
    }

    #[test]
    fn add_comment_links_created_items() {
        let data = workflow("w");
        let outputs = safe_outputs_with(&[
            SafeOutputType::CreateIssue,
            SafeOutputType::CreatePullRequest,
            SafeOutputType::AddComment,
        ]);
        let step = AddCommentHandler
            .build_step_config(&data, &HandlerContext::new(&outputs, false))
            .expect("build")
            .expect("enabled");
        assert_eq!(
            step.env["GH_AW_CREATED_ISSUE_NUMBER"],
            "${{ needs.create_issue.outputs.issue_number }}"
        );
        assert!(step.env.contains_key("GH_AW_CREATED_PULL_REQUEST_URL"));
        assert!(!step.env.contains_key("GH_AW_CREATED_DISCUSSION_URL"));
        assert_eq!(
            step.needs.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["create_issue", "create_pull_request"]
        );
    }

    #[test]
    fn add_comment_gates_on_triggering_item_by_default() {
        let data = workflow("w");
        let mut outputs = safe_outputs_with(&[SafeOutputType::AddComment]);
        let ctx = HandlerContext::new(&outputs, false);
        let step = AddCommentHandler
            .build_step_config(&data, &ctx)
            .expect("build")
            .expect("enabled");
        assert!(step.condition.to_string().contains("github.event.issue.number"));

        outputs.add_comment = Enablement::Enabled(OutputTypeConfig {
            target: Some(Target::Any),
            ..OutputTypeConfig::default()
        });
        let step = AddCommentHandler
            .build_step_config(&data, &HandlerContext::new(&outputs, false))
            .expect("build")
            .expect("enabled");
        assert!(!step.condition.to_string().contains("github.event"));
        assert_eq!(step.env["GH_AW_COMMENT_TARGET"], "*");
    }

    #[test]
    fn discussion_reads_temporary_id_map() {
        let data = workflow("w");
        let outputs = safe_outputs_with(&[
            SafeOutputType::CreateIssue,
            SafeOutputType::CreateDiscussion,
        ]);
        let mut ctx = HandlerContext::new(&outputs, false);
        ctx.temp_id_map = Some(OutputRef {
            job: "create_issue".to_string(),
            output: TEMPORARY_ID_MAP_OUTPUT.to_string(),
        });
        let step = CreateDiscussionHandler
            .build_step_config(&data, &ctx)
            .expect("build")
            .expect("enabled");
        assert_eq!(
            step.env["GH_AW_TEMPORARY_ID_MAP"],
            "${{ needs.create_issue.outputs.temporary_id_map }}"
        );
        assert!(step.needs.contains("create_issue"));
    }
}
