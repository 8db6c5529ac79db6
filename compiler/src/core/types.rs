//! Shared enums for the core compiler modules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::CompileError;

/// Kind of GitHub side effect an agent may request through safe outputs.
///
/// Variants are ordered the way the compiler emits handler jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeOutputType {
    CreateIssue,
    CreateDiscussion,
    AddComment,
    CreatePullRequest,
    CreatePrReviewComment,
    CreateCodeScanningAlert,
    AddLabels,
    PushToPullRequestBranch,
    CreateAgentTask,
    MissingTool,
    Noop,
}

impl SafeOutputType {
    pub const ALL: [SafeOutputType; 11] = [
        SafeOutputType::CreateIssue,
        SafeOutputType::CreateDiscussion,
        SafeOutputType::AddComment,
        SafeOutputType::CreatePullRequest,
        SafeOutputType::CreatePrReviewComment,
        SafeOutputType::CreateCodeScanningAlert,
        SafeOutputType::AddLabels,
        SafeOutputType::PushToPullRequestBranch,
        SafeOutputType::CreateAgentTask,
        SafeOutputType::MissingTool,
        SafeOutputType::Noop,
    ];

    /// Job-type name; also the name of the emitted job.
    pub fn as_str(self) -> &'static str {
        match self {
            SafeOutputType::CreateIssue => "create_issue",
            SafeOutputType::CreateDiscussion => "create_discussion",
            SafeOutputType::AddComment => "add_comment",
            SafeOutputType::CreatePullRequest => "create_pull_request",
            SafeOutputType::CreatePrReviewComment => "create_pr_review_comment",
            SafeOutputType::CreateCodeScanningAlert => "create_code_scanning_alert",
            SafeOutputType::AddLabels => "add_labels",
            SafeOutputType::PushToPullRequestBranch => "push_to_pull_request_branch",
            SafeOutputType::CreateAgentTask => "create_agent_task",
            SafeOutputType::MissingTool => "missing_tool",
            SafeOutputType::Noop => "noop",
        }
    }
}

impl fmt::Display for SafeOutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SafeOutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SafeOutputType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown safe output job type: {s}"))
    }
}

/// One request the agent wrote to its safe-output file.
///
/// Parsed outside the compiler; the type lives here so the job-type names
/// the agent uses and the ones the compiler emits stay in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    /// `create_issue` or `create-issue`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Placeholder other messages may reference before real IDs exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutputMessage {
    pub fn output_type(&self) -> Result<SafeOutputType, CompileError> {
        self.kind
            .replace('-', "_")
            .parse()
            .map_err(|_| CompileError::UnknownJobType(self.kind.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in SafeOutputType::ALL {
            assert_eq!(kind.as_str().parse::<SafeOutputType>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("create_gist".parse::<SafeOutputType>().is_err());
    }

    #[test]
    fn output_message_accepts_dashed_type() {
        let message: OutputMessage = serde_json::from_str(
            r#"{"type":"create-issue","temporary_id":"aw_1a2b3c","title":"Flaky test","body":"..."}"#,
        )
        .expect("parse");
        assert_eq!(message.output_type(), Ok(SafeOutputType::CreateIssue));
        assert_eq!(message.temporary_id.as_deref(), Some("aw_1a2b3c"));
        assert_eq!(message.fields["title"], "Flaky test");
    }

    #[test]
    fn output_message_with_unknown_type_fails() {
        let message: OutputMessage =
            serde_json::from_str(r#"{"type":"create-gist"}"#).expect("parse");
        assert_eq!(
            message.output_type(),
            Err(CompileError::UnknownJobType("create-gist".to_string()))
        );
    }
}
