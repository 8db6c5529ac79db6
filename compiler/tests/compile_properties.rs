//! End-to-end properties of compiled job graphs.
//!
//! Builds workflows through the public API and checks the graph shape the
//! safe-output model promises: agent isolation, detection gating, handler
//! env coverage, and dependency wiring.

use compiler::core::compiler::{CompileOptions, CompiledWorkflow, compile};
use compiler::core::env_manifest;
use compiler::core::error::{CompileError, ErrorKind};
use compiler::core::handlers::HandlerRegistry;
use compiler::core::permission_validator::validate_permissions;
use compiler::core::permissions::{PermissionLevel, PermissionScope, Permissions};
use compiler::core::types::SafeOutputType;
use compiler::io::workflow_loader::parse_workflow;
use compiler::test_support::{
    custom_job_with_step, detection_engine, safe_outputs_with, workflow,
};
use compiler::workflow::WorkflowData;

fn compile_default(data: &WorkflowData) -> Result<CompiledWorkflow, CompileError> {
    compile(
        data,
        &HandlerRegistry::with_defaults(),
        &detection_engine(),
        &CompileOptions::default(),
    )
}

fn all_types_workflow() -> WorkflowData {
    let mut data = workflow("everything");
    data.safe_outputs = Some(safe_outputs_with(&SafeOutputType::ALL));
    data
}

#[test]
fn every_handler_job_needs_agent_and_detection() {
    let compiled = compile_default(&all_types_workflow()).expect("compile");
    for kind in SafeOutputType::ALL {
        let job = compiled.graph.get(kind.as_str()).expect("handler job");
        assert!(job.needs_job("agent"), "{kind} must need agent");
        assert!(job.needs_job("detection"), "{kind} must need detection");
        let condition = job.condition.as_deref().expect("condition");
        assert!(
            condition.contains("needs.detection.outputs.success == 'true'"),
            "{kind}: {condition}"
        );
    }
}

#[test]
fn handler_step_env_satisfies_manifest() {
    let compiled = compile_default(&all_types_workflow()).expect("compile");
    for kind in SafeOutputType::ALL {
        let job = compiled.graph.get(kind.as_str()).expect("handler job");
        let step = job
            .steps
            .iter()
            .find(|step| step.id.as_deref() == Some(kind.as_str()))
            .expect("handler step");
        let warnings = env_manifest::validate(kind.as_str(), &step.env);
        assert!(warnings.is_empty(), "{kind}: {warnings:?}");
    }
}

#[test]
fn agent_job_gets_only_declared_permissions() {
    let mut data = all_types_workflow();
    data.permissions = Permissions::new().with(PermissionScope::Contents, PermissionLevel::Read);
    let compiled = compile_default(&data).expect("compile");
    let agent = compiled.graph.get("agent").expect("agent");
    assert!(agent.permissions.is_read_only());
    assert_eq!(agent.permissions, data.permissions);

    let detection = compiled.graph.get("detection").expect("detection");
    assert!(detection.permissions.is_read_only());
}

#[test]
fn issue_then_discussion_shares_temporary_ids() {
    let data = parse_workflow(
        r#"
name = "weekly report"
[safe-outputs]
create-issue = { max = 1 }
create-discussion = { max = 1 }
"#,
    )
    .expect("parse");
    let compiled = compile_default(&data).expect("compile");
    let discussion = compiled.graph.get("create_discussion").expect("discussion");
    assert!(discussion.needs_job("agent"));
    assert!(discussion.needs_job("detection"));
    assert!(discussion.needs_job("create_issue"));
    let order = compiled.graph.topological_order().expect("order");
    let position = |name: &str| order.iter().position(|job| job == name).expect("in order");
    assert!(position("create_issue") < position("create_discussion"));
    assert_eq!(order.last().map(String::as_str), Some("conclusion"));
}

#[test]
fn custom_jobs_referencing_each_other_are_rejected() {
    let mut data = workflow("loop");
    data.jobs.insert(
        "left".to_string(),
        custom_job_with_step("echo ${{ needs.right.outputs.value }}"),
    );
    data.jobs.insert(
        "right".to_string(),
        custom_job_with_step("echo ${{ needs.left.outputs.value }}"),
    );
    let err = compile_default(&data).expect_err("cycle");
    assert_eq!(err.kind(), ErrorKind::GraphIntegrityError);
    match err {
        CompileError::GraphIntegrity { jobs, .. } => {
            assert!(jobs.contains(&"left".to_string()));
            assert!(jobs.contains(&"right".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_toolset_permission_is_reported() {
    let toolsets = vec!["issues".to_string()];
    let read_only = validate_permissions(&toolsets, true, &Permissions::new());
    assert_eq!(
        read_only.missing,
        Permissions::new().with(PermissionScope::Issues, PermissionLevel::Read)
    );

    let writable = validate_permissions(&toolsets, false, &Permissions::new());
    assert_eq!(
        writable.missing.get(PermissionScope::Issues),
        PermissionLevel::Write
    );
}

#[test]
fn all_toolsets_skip_excess_check() {
    let granted = Permissions::new().with(PermissionScope::Packages, PermissionLevel::Write);
    let result = validate_permissions(&["all".to_string()], false, &granted);
    assert!(result.excess.is_empty());
    assert!(!result.missing.is_empty());
}

#[test]
fn staged_mode_and_custom_token_flow_into_steps() {
    let data = parse_workflow(
        r#"
name = "preview"
github-token = "${{ secrets.WORKFLOW_TOKEN }}"
[safe-outputs]
staged = true
add-labels = { allowed = ["bug", "docs"], github-token = "${{ secrets.LABELS_TOKEN }}" }
noop = true
"#,
    )
    .expect("parse");
    let compiled = compile_default(&data).expect("compile");

    let labels = compiled.graph.get("add_labels").expect("labels");
    let step = labels
        .steps
        .iter()
        .find(|step| step.id.as_deref() == Some("add_labels"))
        .expect("step");
    assert_eq!(step.env["GH_AW_SAFE_OUTPUTS_STAGED"], "true");
    assert_eq!(step.env["GH_AW_LABELS_ALLOWED"], "bug,docs");
    assert_eq!(step.with["github-token"], "${{ secrets.LABELS_TOKEN }}");

    let noop = compiled.graph.get("noop").expect("noop");
    let step = noop
        .steps
        .iter()
        .find(|step| step.id.as_deref() == Some("noop"))
        .expect("step");
    assert_eq!(step.with["github-token"], "${{ secrets.WORKFLOW_TOKEN }}");
}

#[test]
fn github_tool_without_toolsets_checks_the_default_set() {
    let text = r#"
name = "w"
strict = true
permissions = { contents = "read", issues = "read", pull-requests = "read" }

[github-tool]
read-only = true
"#;
    let data = parse_workflow(text).expect("parse");
    let compiled = compile_default(&data).expect("compile");
    assert!(compiled.warnings.is_empty());

    let text = r#"
name = "w"
strict = true
permissions = { contents = "read" }

[github-tool]
read-only = true
"#;
    let err = compile_default(&parse_workflow(text).expect("parse")).expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::PermissionError);
    assert!(err.to_string().contains("issues: read"));
    assert!(!err.to_string().contains("Over-provisioned"));
}

#[test]
fn empty_toolset_list_skips_permission_checks() {
    let text = r#"
name = "w"
strict = true
permissions = { contents = "write" }

[github-tool]
toolsets = []
"#;
    let compiled = compile_default(&parse_workflow(text).expect("parse")).expect("compile");
    assert!(compiled.warnings.is_empty());
}
