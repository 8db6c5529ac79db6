//! Reporting handlers: code scanning, agent tasks, missing tools, noop.

use std::collections::BTreeMap;

use super::{
    AGENT_OUTPUT_PATH, HandlerContext, SafeOutputHandler, StepConfig, base_step, outputs,
    permissions,
};
use crate::core::error::CompileError;
use crate::core::permissions::{PermissionLevel as L, PermissionScope as S, Permissions};
use crate::core::types::SafeOutputType;
use crate::job::Step;
use crate::workflow::WorkflowData;

pub struct CreateCodeScanningAlertHandler;

impl SafeOutputHandler for CreateCodeScanningAlertHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreateCodeScanningAlert
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_code_scanning_alert.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env("GH_AW_WORKFLOW_FILENAME", data.workflow_filename());
        step.set_env_opt("GH_AW_SECURITY_REPORT_DRIVER", config.driver.as_deref());
        step.set_env_opt("GH_AW_SECURITY_REPORT_MAX", config.max);
        step.post_steps.insert(
            0,
            Step::uses("Upload SARIF", "github/codeql-action/upload-sarif@v3")
                .with_if(format!(
                    "steps.{}.outputs.sarif_file != ''",
                    step.step_id
                ))
                .with_input(
                    "sarif_file",
                    format!("${{{{ steps.{}.outputs.sarif_file }}}}", step.step_id),
                )
                .with_input("category", "safe-outputs"),
        );
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("findings_count", "findings_count"), ("sarif_file", "sarif_file")])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read), (S::SecurityEvents, L::Write)])
    }
}

pub struct CreateAgentTaskHandler;

impl SafeOutputHandler for CreateAgentTaskHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::CreateAgentTask
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.create_agent_task.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GITHUB_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env("GITHUB_REPOSITORY", "${{ github.repository }}");
        step.set_env("GITHUB_REF_NAME", "${{ github.ref_name }}");
        step.set_env_opt("GITHUB_AW_TARGET_REPO", config.target_repo.as_deref());
        step.set_env_opt("GITHUB_AW_AGENT_TASK_BASE", config.base.as_deref());
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("task_number", "task_number"), ("task_url", "task_url")])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[
            (S::Contents, L::Read),
            (S::Issues, L::Write),
            (S::PullRequests, L::Write),
        ])
    }
}

pub struct MissingToolHandler;

impl SafeOutputHandler for MissingToolHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::MissingTool
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.missing_tool.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_MISSING_TOOL_MAX", config.max);
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("tools_reported", "tools_reported"), ("total_count", "total_count")])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read)])
    }
}

pub struct NoopHandler;

impl SafeOutputHandler for NoopHandler {
    fn output_type(&self) -> SafeOutputType {
        SafeOutputType::Noop
    }

    fn build_step_config(
        &self,
        data: &WorkflowData,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<StepConfig>, CompileError> {
        let Some(config) = ctx.safe_outputs.noop.config() else {
            return Ok(None);
        };
        let mut step = base_step(self, config, data, ctx)?;
        step.set_env("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_PATH);
        step.set_env_opt("GH_AW_NOOP_MAX", config.max);
        Ok(Some(step))
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        outputs(&[("noop_message", "noop_message")])
    }

    fn permissions(&self) -> Permissions {
        permissions(&[(S::Contents, L::Read)])
    }
}
