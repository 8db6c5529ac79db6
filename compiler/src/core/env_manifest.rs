//! Declarative env-var manifest for safe-output jobs.
//!
//! Each job type declares the environment variables its script reads, split
//! into required and optional entries. Handlers are checked against this
//! table at compile time so a job can never ship with a variable its script
//! does not expect, or without one it cannot run without.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::error::CompileError;
use crate::core::types::SafeOutputType;

/// One variable a job script reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVarManifestEntry {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<&'static str>,
}

/// Every variable one job type reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEnvManifest {
    pub job_type: SafeOutputType,
    pub description: &'static str,
    pub env_vars: Vec<EnvVarManifestEntry>,
}

impl JobEnvManifest {
    pub fn entry(&self, name: &str) -> Option<&EnvVarManifestEntry> {
        self.env_vars.iter().find(|entry| entry.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.env_vars
            .iter()
            .filter(|entry| entry.required)
            .map(|entry| entry.name)
    }
}

const fn req(name: &'static str, description: &'static str) -> EnvVarManifestEntry {
    EnvVarManifestEntry {
        name,
        required: true,
        description,
        default_value: None,
    }
}

const fn opt(name: &'static str, description: &'static str) -> EnvVarManifestEntry {
    EnvVarManifestEntry {
        name,
        required: false,
        description,
        default_value: None,
    }
}

const fn opt_default(
    name: &'static str,
    description: &'static str,
    default_value: &'static str,
) -> EnvVarManifestEntry {
    EnvVarManifestEntry {
        name,
        required: false,
        description,
        default_value: Some(default_value),
    }
}

const COMMON: &[EnvVarManifestEntry] = &[
    req("GH_AW_WORKFLOW_NAME", "Workflow name"),
    opt("GH_AW_WORKFLOW_SOURCE", "Workflow source file path"),
    opt("GH_AW_WORKFLOW_SOURCE_URL", "URL to workflow source file"),
    opt("GH_AW_TRACKER_ID", "Tracker ID for workflow runs"),
    opt("GH_AW_ENGINE_ID", "AI engine identifier"),
    opt("GH_AW_ENGINE_VERSION", "AI engine version"),
    opt("GH_AW_ENGINE_MODEL", "AI engine model"),
    opt(
        "GH_AW_SAFE_OUTPUTS_STAGED",
        "Set to 'true' when in staged/trial mode",
    ),
    opt(
        "GH_AW_TARGET_REPO_SLUG",
        "Target repository for cross-repo operations (owner/repo)",
    ),
    opt(
        "GH_AW_SAFE_OUTPUT_MESSAGES",
        "JSON configuration for custom messages",
    ),
    opt(
        "GH_AW_SAFE_OUTPUT_MAX",
        "Maximum number of items of this type to process",
    ),
    opt(
        "GH_AW_SAFE_OUTPUT_MIN",
        "Minimum number of items of this type the agent must emit",
    ),
    req("GITHUB_TOKEN", "GitHub token for API calls"),
];

const AGENT_OUTPUT_DESCRIPTION: &str = "Path to agent output file";

fn job(
    job_type: SafeOutputType,
    description: &'static str,
    extra: &[EnvVarManifestEntry],
) -> (SafeOutputType, JobEnvManifest) {
    let mut env_vars = COMMON.to_vec();
    env_vars.extend_from_slice(extra);
    (
        job_type,
        JobEnvManifest {
            job_type,
            description,
            env_vars,
        },
    )
}

static MANIFEST: LazyLock<BTreeMap<SafeOutputType, JobEnvManifest>> = LazyLock::new(|| {
    let manifest: BTreeMap<_, _> = [
        job(
            SafeOutputType::CreateIssue,
            "Creates GitHub issues from agent output",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt("GH_AW_ISSUE_TITLE_PREFIX", "Prefix for issue titles"),
                opt(
                    "GH_AW_ISSUE_LABELS",
                    "Comma-separated labels to apply to issues",
                ),
                opt(
                    "GH_AW_ISSUE_ALLOWED_LABELS",
                    "Comma-separated list of labels the agent may add",
                ),
                opt(
                    "GH_AW_ASSIGN_COPILOT",
                    "Set to 'true' to assign copilot to created issues",
                ),
            ],
        ),
        job(
            SafeOutputType::CreateDiscussion,
            "Creates GitHub discussions from agent output",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt("GH_AW_DISCUSSION_CATEGORY", "Discussion category ID or name"),
                opt(
                    "GH_AW_DISCUSSION_TITLE_PREFIX",
                    "Prefix for discussion titles",
                ),
                opt(
                    "GH_AW_DISCUSSION_LABELS",
                    "Comma-separated labels to apply to discussions",
                ),
                opt(
                    "GH_AW_CLOSE_OLDER_DISCUSSIONS",
                    "Set to 'true' to close older discussions with same prefix or labels",
                ),
                opt(
                    "GH_AW_TEMPORARY_ID_MAP",
                    "Temporary ID map from create_issue job",
                ),
            ],
        ),
        job(
            SafeOutputType::AddComment,
            "Adds comments to issues, pull requests, or discussions",
            &[
                opt("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt(
                    "GH_AW_COMMENT_TARGET",
                    "Target for comment: 'triggering' (default), '*' (any), or issue number",
                ),
                opt(
                    "GITHUB_AW_COMMENT_DISCUSSION",
                    "Set to 'true' to target discussion comments",
                ),
                opt(
                    "GH_AW_HIDE_OLDER_COMMENTS",
                    "Set to 'true' to minimize older comments",
                ),
                opt(
                    "GH_AW_ALLOWED_REASONS",
                    "JSON array of allowed reasons for hiding comments",
                ),
                opt(
                    "GH_AW_CREATED_ISSUE_URL",
                    "Issue URL output from create_issue job",
                ),
                opt(
                    "GH_AW_CREATED_ISSUE_NUMBER",
                    "Issue number output from create_issue job",
                ),
                opt(
                    "GH_AW_TEMPORARY_ID_MAP",
                    "Temporary ID map from create_issue job",
                ),
                opt(
                    "GH_AW_CREATED_DISCUSSION_URL",
                    "Discussion URL output from create_discussion job",
                ),
                opt(
                    "GH_AW_CREATED_DISCUSSION_NUMBER",
                    "Discussion number output from create_discussion job",
                ),
                opt(
                    "GH_AW_CREATED_PULL_REQUEST_URL",
                    "PR URL output from create_pull_request job",
                ),
                opt(
                    "GH_AW_CREATED_PULL_REQUEST_NUMBER",
                    "PR number output from create_pull_request job",
                ),
            ],
        ),
        job(
            SafeOutputType::CreatePullRequest,
            "Creates a pull request from agent code changes",
            &[
                req("GH_AW_WORKFLOW_ID", "Main job name used for branch naming"),
                req("GH_AW_BASE_BRANCH", "Base branch from github.ref_name"),
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt("GH_AW_PR_TITLE_PREFIX", "Prefix for PR titles"),
                opt("GH_AW_PR_LABELS", "Comma-separated labels to apply to PR"),
                opt(
                    "GH_AW_PR_ALLOWED_LABELS",
                    "Comma-separated list of allowed labels",
                ),
                opt_default(
                    "GH_AW_PR_DRAFT",
                    "Set to 'true' or 'false' for draft status",
                    "true",
                ),
                opt_default(
                    "GH_AW_PR_IF_NO_CHANGES",
                    "Behavior when no changes: 'warn', 'error', or 'ignore'",
                    "warn",
                ),
                opt_default(
                    "GH_AW_PR_ALLOW_EMPTY",
                    "Allow creating PR without changes",
                    "false",
                ),
                opt_default("GH_AW_MAX_PATCH_SIZE", "Maximum patch size in KB", "1024"),
                opt(
                    "GH_AW_PR_EXPIRES",
                    "Days until PR expires and should be closed",
                ),
                opt(
                    "GH_AW_COMMENT_ID",
                    "Comment ID from activation job (when reaction is enabled)",
                ),
                opt(
                    "GH_AW_COMMENT_REPO",
                    "Comment repository from activation job (when reaction is enabled)",
                ),
            ],
        ),
        job(
            SafeOutputType::CreatePrReviewComment,
            "Creates review comments on pull requests",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt(
                    "GH_AW_PR_REVIEW_COMMENT_TARGET",
                    "Target PR for review comments",
                ),
                opt(
                    "GH_AW_PR_REVIEW_COMMENT_SIDE",
                    "Side of diff: 'LEFT' or 'RIGHT'",
                ),
            ],
        ),
        job(
            SafeOutputType::CreateCodeScanningAlert,
            "Creates code scanning alerts from security findings",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                req("GH_AW_WORKFLOW_FILENAME", "Workflow filename"),
                opt(
                    "GH_AW_SECURITY_REPORT_DRIVER",
                    "Driver for security reporting",
                ),
                opt(
                    "GH_AW_SECURITY_REPORT_MAX",
                    "Maximum number of security reports",
                ),
            ],
        ),
        job(
            SafeOutputType::AddLabels,
            "Adds labels to issues or pull requests",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt(
                    "GH_AW_LABELS_ALLOWED",
                    "Comma-separated list of labels the agent may add",
                ),
                opt(
                    "GH_AW_LABELS_TARGET",
                    "Target for labels: 'triggering' (default), '*' (any), or issue number",
                ),
            ],
        ),
        job(
            SafeOutputType::PushToPullRequestBranch,
            "Pushes code changes to an existing pull request branch",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                req("GH_AW_PUSH_TARGET", "Target for push operations"),
                opt("GH_AW_PR_TITLE_PREFIX", "Prefix for PR titles"),
                opt("GH_AW_PR_LABELS", "Comma-separated labels to apply"),
                opt("GH_AW_COMMIT_TITLE_SUFFIX", "Suffix for commit messages"),
                opt(
                    "GH_AW_PUSH_IF_NO_CHANGES",
                    "Behavior when no changes to push",
                ),
                opt_default("GH_AW_MAX_PATCH_SIZE", "Maximum patch size in KB", "1024"),
            ],
        ),
        job(
            SafeOutputType::CreateAgentTask,
            "Creates agent tasks for follow-up work",
            &[
                req("GITHUB_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                req("GITHUB_REPOSITORY", "Repository slug (owner/repo)"),
                opt("GITHUB_AW_TARGET_REPO", "Target repository for agent tasks"),
                opt(
                    "GITHUB_AW_AGENT_TASK_BASE",
                    "Base configuration for agent tasks",
                ),
                opt("GITHUB_REF_NAME", "Current branch name"),
            ],
        ),
        job(
            SafeOutputType::MissingTool,
            "Reports missing tools or functionality requested by the agent",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt(
                    "GH_AW_MISSING_TOOL_MAX",
                    "Maximum number of missing tools to report",
                ),
            ],
        ),
        job(
            SafeOutputType::Noop,
            "No-operation job that logs messages without taking GitHub API actions",
            &[
                req("GH_AW_AGENT_OUTPUT", AGENT_OUTPUT_DESCRIPTION),
                opt("GH_AW_NOOP_MAX", "Maximum number of noop messages to log"),
            ],
        ),
    ]
    .into_iter()
    .collect();
    debug!(job_types = manifest.len(), "built safe output env manifest");
    manifest
});

/// The full manifest, keyed by job type.
pub fn get_manifest() -> &'static BTreeMap<SafeOutputType, JobEnvManifest> {
    &MANIFEST
}

/// Every job type that has a manifest entry.
pub fn supported_job_types() -> Vec<SafeOutputType> {
    MANIFEST.keys().copied().collect()
}

/// Manifest for one job type name.
pub fn job_manifest(job_type: &str) -> Result<&'static JobEnvManifest, CompileError> {
    job_type
        .parse::<SafeOutputType>()
        .ok()
        .and_then(|kind| MANIFEST.get(&kind))
        .ok_or_else(|| CompileError::UnknownJobType(job_type.to_string()))
}

/// Names of the required variables for `job_type`, in manifest order.
pub fn required_vars(job_type: &str) -> Result<Vec<&'static str>, CompileError> {
    Ok(job_manifest(job_type)?.required().collect())
}

/// Every declared variable for `job_type`.
pub fn all_vars(job_type: &str) -> Result<&'static [EnvVarManifestEntry], CompileError> {
    Ok(&job_manifest(job_type)?.env_vars)
}

/// Return the required variables missing from `provided`.
///
/// An unknown job type is logged and yields an empty list.
pub fn validate(job_type: &str, provided: &BTreeMap<String, String>) -> Vec<String> {
    let required = match required_vars(job_type) {
        Ok(required) => required,
        Err(_) => {
            warn!(job_type, "unknown job type during env validation");
            return Vec::new();
        }
    };
    required
        .into_iter()
        .filter(|name| !provided.contains_key(*name))
        .map(str::to_string)
        .collect()
}

/// Check the env a handler emitted for one step.
///
/// Fails on the first undeclared variable, then on any missing required ones.
pub fn check_step_env(
    job_type: SafeOutputType,
    env: &BTreeMap<String, String>,
) -> Result<(), CompileError> {
    let manifest = job_manifest(job_type.as_str())?;
    if let Some(name) = env.keys().find(|name| manifest.entry(name).is_none()) {
        return Err(CompileError::ManifestViolation {
            job_type: job_type.to_string(),
            message: format!("env var '{name}' is not declared in the manifest"),
        });
    }
    let missing = validate(job_type.as_str(), env);
    if !missing.is_empty() {
        return Err(CompileError::ManifestViolation {
            job_type: job_type.to_string(),
            message: format!("missing required env vars: {}", missing.join(", ")),
        });
    }
    Ok(())
}
