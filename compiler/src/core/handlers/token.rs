//! GitHub token selection for safe-output jobs.

use crate::core::permissions::{PermissionLevel, Permissions};
use crate::job::Step;
use crate::workflow::{AppConfig, OutputTypeConfig, SafeOutputsConfig, WorkflowData};

/// Used when neither a per-type nor a top-level token is configured.
pub const FALLBACK_TOKEN: &str = "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Token minted by the `app-token` step.
pub const APP_TOKEN: &str = "${{ steps.app-token.outputs.token }}";

/// `custom` if set, else `top_level` if set, else [`FALLBACK_TOKEN`].
///
/// Empty strings count as unset.
pub fn effective_token(custom: &str, top_level: &str) -> String {
    if !custom.is_empty() {
        custom.to_string()
    } else if !top_level.is_empty() {
        top_level.to_string()
    } else {
        FALLBACK_TOKEN.to_string()
    }
}

/// Per-type token, then app token, then safe-outputs token, then workflow token.
pub(super) fn handler_token(
    config: &OutputTypeConfig,
    data: &WorkflowData,
    safe_outputs: &SafeOutputsConfig,
) -> String {
    let top_level = if safe_outputs.app.is_some() {
        APP_TOKEN
    } else {
        [&safe_outputs.github_token, &data.github_token]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|token| !token.is_empty())
            .unwrap_or("")
    };
    effective_token(config.github_token.as_deref().unwrap_or(""), top_level)
}

pub(super) fn mint_app_token_step(app: &AppConfig, permissions: &Permissions) -> Step {
    let mut step = Step::uses("Generate GitHub App token", "actions/create-github-app-token@v2")
        .with_id("app-token")
        .with_input("app-id", app.app_id.clone())
        .with_input("private-key", app.private_key.clone())
        .with_input(
            "owner",
            app.owner
                .clone()
                .unwrap_or_else(|| "${{ github.repository_owner }}".to_string()),
        );
    let repositories = if app.repositories.is_empty() {
        "${{ github.event.repository.name }}".to_string()
    } else {
        app.repositories.join(",")
    };
    step = step.with_input("repositories", repositories);
    for (scope, level) in permissions.iter() {
        if level > PermissionLevel::None {
            step = step.with_input(&format!("permission-{scope}"), level.as_str());
        }
    }
    step
}

pub(super) fn invalidate_app_token_step() -> Step {
    Step::run(
        "Invalidate GitHub App token",
        "gh api --method DELETE /installation/token || true",
    )
    .with_if("always()")
    .with_env("GH_TOKEN", APP_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::workflow;

    #[test]
    fn effective_token_precedence() {
        assert_eq!(effective_token("A", "B"), "A");
        assert_eq!(effective_token("", "B"), "B");
        assert_eq!(
            effective_token("", ""),
            "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}"
        );
    }

    #[test]
    fn handler_token_chain() {
        let mut data = workflow("w");
        let mut outputs = SafeOutputsConfig::default();
        let mut config = OutputTypeConfig::default();
        assert_eq!(handler_token(&config, &data, &outputs), FALLBACK_TOKEN);

        data.github_token = Some("${{ secrets.WORKFLOW }}".to_string());
        assert_eq!(handler_token(&config, &data, &outputs), "${{ secrets.WORKFLOW }}");

        outputs.github_token = Some("${{ secrets.SAFE }}".to_string());
        assert_eq!(handler_token(&config, &data, &outputs), "${{ secrets.SAFE }}");

        outputs.app = Some(AppConfig {
            app_id: "${{ vars.APP_ID }}".to_string(),
            private_key: "${{ secrets.APP_KEY }}".to_string(),
            ..AppConfig::default()
        });
        assert_eq!(handler_token(&config, &data, &outputs), APP_TOKEN);

        config.github_token = Some("${{ secrets.TYPE }}".to_string());
        assert_eq!(handler_token(&config, &data, &outputs), "${{ secrets.TYPE }}");
    }

    #[test]
    fn mint_step_scopes_token_to_job_permissions() {
        let app = AppConfig {
            app_id: "1".to_string(),
            private_key: "k".to_string(),
            owner: Some("octo".to_string()),
            repositories: vec!["a".to_string(), "b".to_string()],
        };
        let perms = Permissions::new()
            .with(
                crate::core::permissions::PermissionScope::Issues,
                PermissionLevel::Write,
            )
            .with(
                crate::core::permissions::PermissionScope::Contents,
                PermissionLevel::Read,
            );
        let step = mint_app_token_step(&app, &perms);
        assert_eq!(step.id.as_deref(), Some("app-token"));
        assert_eq!(step.with["repositories"], "a,b");
        assert_eq!(step.with["permission-issues"], "write");
        assert_eq!(step.with["permission-contents"], "read");
    }
}
