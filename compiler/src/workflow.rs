//! Workflow configuration model.
//!
//! A workflow is described in TOML with kebab-case keys. The model is
//! immutable once loaded; the compiler only reads it.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::core::permissions::Permissions;
use crate::core::types::SafeOutputType;
use crate::job::Step;

/// Three-state switch for an optional feature.
///
/// A missing key is `Absent`, `false` is `Disabled`, and `true` or a table
/// is `Enabled` (with defaults for `true`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Enablement<T> {
    #[default]
    Absent,
    Enabled(T),
    Disabled,
}

impl<T> Enablement<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Enablement::Enabled(_))
    }

    pub fn config(&self) -> Option<&T> {
        match self {
            Enablement::Enabled(config) => Some(config),
            Enablement::Absent | Enablement::Disabled => None,
        }
    }
}

impl<'de, T> Deserialize<'de> for Enablement<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Flag(bool),
            Config(T),
        }

        Ok(match Raw::<T>::deserialize(deserializer)? {
            Raw::Flag(true) => Enablement::Enabled(T::default()),
            Raw::Flag(false) => Enablement::Disabled,
            Raw::Config(config) => Enablement::Enabled(config),
        })
    }
}

/// Which issue or pull request a handler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The issue or PR that triggered the workflow.
    Triggering,
    /// Any item; the agent names it in its output.
    Any,
    Number(u64),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Triggering => f.write_str("triggering"),
            Target::Any => f.write_str("*"),
            Target::Number(number) => write!(f, "{number}"),
        }
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(number) => Ok(Target::Number(number)),
            Raw::Text(text) => match text.trim() {
                "triggering" => Ok(Target::Triggering),
                "*" => Ok(Target::Any),
                other => other.parse().map(Target::Number).map_err(|_| {
                    de::Error::custom(format!(
                        "invalid target '{other}' (expected 'triggering', '*', or a number)"
                    ))
                }),
            },
        }
    }
}

/// Settings shared by every safe output type.
///
/// Type-specific knobs are optional and ignored by handlers that do not read
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputTypeConfig {
    pub max: Option<u32>,
    pub min: Option<u32>,
    pub target: Option<Target>,
    pub target_repo: Option<String>,
    pub allowed: Vec<String>,
    pub github_token: Option<String>,
    pub staged: Option<bool>,
    pub title_prefix: Option<String>,
    pub labels: Vec<String>,
    pub category: Option<String>,
    pub draft: Option<bool>,
    pub if_no_changes: Option<String>,
    pub allow_empty: Option<bool>,
    pub commit_title_suffix: Option<String>,
    pub side: Option<String>,
    pub driver: Option<String>,
    pub base: Option<String>,
    pub discussion: Option<bool>,
    pub hide_older_comments: Option<bool>,
    pub close_older_discussions: Option<bool>,
}

/// `threat-detection` setting: a flag or a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ThreatDetectionSetting {
    Flag(bool),
    Config(ThreatDetectionConfig),
}

impl ThreatDetectionSetting {
    /// Explicit on/off; a table without `enabled` means on.
    pub fn enabled(&self) -> bool {
        match self {
            ThreatDetectionSetting::Flag(enabled) => *enabled,
            ThreatDetectionSetting::Config(config) => config.enabled.unwrap_or(true),
        }
    }

    pub fn config(&self) -> Option<&ThreatDetectionConfig> {
        match self {
            ThreatDetectionSetting::Flag(_) => None,
            ThreatDetectionSetting::Config(config) => Some(config),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ThreatDetectionConfig {
    pub enabled: Option<bool>,
    /// Extra instructions: a repository path or an `https://` URL.
    pub prompt: Option<String>,
    /// Steps appended after the detection engine runs.
    pub steps: Vec<Step>,
}

/// GitHub App used to mint a short-lived token for safe-output jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct AppConfig {
    pub app_id: String,
    pub private_key: String,
    pub owner: Option<String>,
    pub repositories: Vec<String>,
}

/// A user-declared job (either `jobs` or `safe-outputs.jobs`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CustomJobConfig {
    pub description: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub needs: Vec<String>,
    #[serde(rename = "if")]
    pub condition: Option<String>,
    pub runs_on: Option<String>,
    pub permissions: Option<Permissions>,
    pub timeout_minutes: Option<u32>,
    pub env: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SafeOutputsConfig {
    pub create_issue: Enablement<OutputTypeConfig>,
    pub create_discussion: Enablement<OutputTypeConfig>,
    pub add_comment: Enablement<OutputTypeConfig>,
    pub create_pull_request: Enablement<OutputTypeConfig>,
    #[serde(
        rename = "create-pull-request-review-comment",
        alias = "create-pr-review-comment"
    )]
    pub create_pr_review_comment: Enablement<OutputTypeConfig>,
    pub create_code_scanning_alert: Enablement<OutputTypeConfig>,
    pub add_labels: Enablement<OutputTypeConfig>,
    pub push_to_pull_request_branch: Enablement<OutputTypeConfig>,
    pub create_agent_task: Enablement<OutputTypeConfig>,
    pub missing_tool: Enablement<OutputTypeConfig>,
    pub noop: Enablement<OutputTypeConfig>,
    pub threat_detection: Option<ThreatDetectionSetting>,
    /// Custom safe-output jobs.
    pub jobs: BTreeMap<String, CustomJobConfig>,
    pub app: Option<AppConfig>,
    pub github_token: Option<String>,
    pub staged: bool,
    pub runs_on: Option<String>,
    /// Env copied to every safe-output job.
    pub env: BTreeMap<String, String>,
    /// Maximum patch size in KB for code-pushing types.
    pub max_patch_size: Option<u32>,
}

impl SafeOutputsConfig {
    pub fn get(&self, kind: SafeOutputType) -> &Enablement<OutputTypeConfig> {
        match kind {
            SafeOutputType::CreateIssue => &self.create_issue,
            SafeOutputType::CreateDiscussion => &self.create_discussion,
            SafeOutputType::AddComment => &self.add_comment,
            SafeOutputType::CreatePullRequest => &self.create_pull_request,
            SafeOutputType::CreatePrReviewComment => &self.create_pr_review_comment,
            SafeOutputType::CreateCodeScanningAlert => &self.create_code_scanning_alert,
            SafeOutputType::AddLabels => &self.add_labels,
            SafeOutputType::PushToPullRequestBranch => &self.push_to_pull_request_branch,
            SafeOutputType::CreateAgentTask => &self.create_agent_task,
            SafeOutputType::MissingTool => &self.missing_tool,
            SafeOutputType::Noop => &self.noop,
        }
    }

    pub fn get_mut(&mut self, kind: SafeOutputType) -> &mut Enablement<OutputTypeConfig> {
        match kind {
            SafeOutputType::CreateIssue => &mut self.create_issue,
            SafeOutputType::CreateDiscussion => &mut self.create_discussion,
            SafeOutputType::AddComment => &mut self.add_comment,
            SafeOutputType::CreatePullRequest => &mut self.create_pull_request,
            SafeOutputType::CreatePrReviewComment => &mut self.create_pr_review_comment,
            SafeOutputType::CreateCodeScanningAlert => &mut self.create_code_scanning_alert,
            SafeOutputType::AddLabels => &mut self.add_labels,
            SafeOutputType::PushToPullRequestBranch => &mut self.push_to_pull_request_branch,
            SafeOutputType::CreateAgentTask => &mut self.create_agent_task,
            SafeOutputType::MissingTool => &mut self.missing_tool,
            SafeOutputType::Noop => &mut self.noop,
        }
    }

    pub fn enabled_types(&self) -> Vec<SafeOutputType> {
        SafeOutputType::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_enabled())
            .collect()
    }
}

/// GitHub MCP tool settings for the agent job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GithubToolConfig {
    /// `["default"]` when the key is absent.
    #[serde(deserialize_with = "comma_list")]
    pub toolsets: Vec<String>,
    pub read_only: bool,
}

impl Default for GithubToolConfig {
    fn default() -> Self {
        Self {
            toolsets: vec!["default".to_string()],
            read_only: false,
        }
    }
}

/// A parsed workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct WorkflowData {
    pub name: String,
    /// Identifier used for branch naming; derived from `source` or `name`.
    pub workflow_id: Option<String>,
    /// Workflow source path (`.github/workflows/triage.md`).
    pub source: Option<String>,
    pub tracker_id: Option<String>,
    pub engine: Option<String>,
    pub github_token: Option<String>,
    /// Permissions granted to the agent job.
    pub permissions: Permissions,
    pub github_tool: Option<GithubToolConfig>,
    pub strict: bool,
    /// Slash command that triggers the workflow.
    pub command: Option<String>,
    /// Reaction added to the triggering item (`eyes`, `rocket`, ...).
    pub reaction: Option<String>,
    pub stop_time: Option<String>,
    pub runs_on: Option<String>,
    pub timeout_minutes: Option<u32>,
    pub jobs: BTreeMap<String, CustomJobConfig>,
    pub safe_outputs: Option<SafeOutputsConfig>,
}

impl WorkflowData {
    pub fn workflow_id(&self) -> String {
        if let Some(id) = self.workflow_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let stem = self
            .source
            .as_deref()
            .and_then(|source| source.rsplit('/').next())
            .and_then(|file| file.split('.').next())
            .filter(|stem| !stem.is_empty());
        slug(stem.unwrap_or(&self.name))
    }

    /// Workflow file name the lock file is emitted as.
    pub fn workflow_filename(&self) -> String {
        format!("{}.lock.yml", self.workflow_id())
    }
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Accept a list or a comma-separated string.
fn comma_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = one_or_many(deserializer)?;
    Ok(raw
        .iter()
        .flat_map(|value| value.split(','))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}
