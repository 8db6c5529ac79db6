//! Test-only helpers for constructing workflows.

use crate::core::threat_detection::{CommandEngine, DEFAULT_DETECTION_COMMAND};
use crate::core::types::SafeOutputType;
use crate::job::Step;
use crate::workflow::{CustomJobConfig, Enablement, SafeOutputsConfig, WorkflowData};

/// Workflow with a name and nothing else.
pub fn workflow(name: &str) -> WorkflowData {
    WorkflowData {
        name: name.to_string(),
        ..WorkflowData::default()
    }
}

/// Safe outputs with each listed type enabled at its defaults.
pub fn safe_outputs_with(kinds: &[SafeOutputType]) -> SafeOutputsConfig {
    let mut outputs = SafeOutputsConfig::default();
    for kind in kinds {
        *outputs.get_mut(*kind) = Enablement::Enabled(Default::default());
    }
    outputs
}

/// Custom job with a single `run` step.
pub fn custom_job_with_step(script: &str) -> CustomJobConfig {
    CustomJobConfig {
        steps: vec![Step::run("Run", script)],
        ..CustomJobConfig::default()
    }
}

/// Detection engine with the default command.
pub fn detection_engine() -> CommandEngine {
    CommandEngine::new(DEFAULT_DETECTION_COMMAND)
}
