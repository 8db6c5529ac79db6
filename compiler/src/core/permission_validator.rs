//! Least-privilege validation of job permissions against GitHub MCP toolsets.
//!
//! The agent job's GitHub tool exposes a list of toolsets. Each toolset needs
//! a fixed set of permission scopes; the validator derives the minimal set and
//! compares it against what the workflow grants:
//! - scopes granted below the derived level are **missing** (always fatal);
//! - scopes granted above it are **excess** (warning, or fatal when strict).

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::permissions::{PermissionLevel, PermissionScope, Permissions};

/// Scopes one toolset needs for reading and for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolsetPermissionRequirement {
    pub toolset: &'static str,
    pub read: &'static [PermissionScope],
    pub write: &'static [PermissionScope],
}

impl ToolsetPermissionRequirement {
    /// Least privilege for this toolset alone.
    pub fn permissions(&self, read_only: bool) -> Permissions {
        let mut permissions: Permissions = self
            .read
            .iter()
            .map(|scope| (*scope, PermissionLevel::Read))
            .collect();
        if !read_only {
            for scope in self.write {
                permissions.set(*scope, PermissionLevel::Write);
            }
        }
        permissions
    }
}

const fn toolset(
    toolset: &'static str,
    read: &'static [PermissionScope],
    write: &'static [PermissionScope],
) -> ToolsetPermissionRequirement {
    ToolsetPermissionRequirement {
        toolset,
        read,
        write,
    }
}

use PermissionScope as S;

/// Static toolset table.
pub const TOOLSETS: &[ToolsetPermissionRequirement] = &[
    toolset("context", &[], &[]),
    toolset("repos", &[S::Contents], &[S::Contents]),
    toolset("issues", &[S::Issues], &[S::Issues]),
    toolset("pull_requests", &[S::PullRequests], &[S::PullRequests]),
    toolset("actions", &[S::Actions], &[]),
    toolset("code_security", &[S::SecurityEvents], &[S::SecurityEvents]),
    toolset("dependabot", &[S::SecurityEvents], &[]),
    toolset("discussions", &[S::Discussions], &[S::Discussions]),
    toolset("experiments", &[], &[]),
    toolset("gists", &[], &[]),
    toolset("labels", &[S::Issues], &[S::Issues]),
    toolset("notifications", &[], &[]),
    toolset("orgs", &[], &[]),
    toolset("projects", &[S::RepositoryProjects], &[S::RepositoryProjects]),
    toolset("secret_protection", &[S::SecurityEvents], &[]),
    toolset(
        "security_advisories",
        &[S::SecurityEvents],
        &[S::SecurityEvents],
    ),
    toolset("stargazers", &[], &[]),
    toolset("users", &[], &[]),
    toolset("search", &[], &[]),
];

/// Toolsets the `default` keyword expands to.
pub const DEFAULT_TOOLSETS: &[&str] = &["context", "repos", "issues", "pull_requests", "users"];

pub fn lookup_toolset(name: &str) -> Option<&'static ToolsetPermissionRequirement> {
    TOOLSETS.iter().find(|entry| entry.toolset == name)
}

/// Expand `default` and `all` keywords; trim, drop blanks, and de-duplicate.
pub fn expand_toolsets(raw: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !expanded.iter().any(|existing| existing == name) {
            expanded.push(name.to_string());
        }
    };
    for name in raw.iter().map(|name| name.trim()) {
        match name {
            "" => {}
            "default" => DEFAULT_TOOLSETS.iter().for_each(|name| push(name)),
            "all" => TOOLSETS.iter().for_each(|entry| push(entry.toolset)),
            other => push(other),
        }
    }
    expanded
}

/// Outcome of [`validate_permissions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionsValidation {
    pub required: Permissions,
    pub missing: Permissions,
    pub excess: Permissions,
    /// Toolset name -> missing scopes it needs (sorted by toolset).
    pub missing_by_toolset: BTreeMap<String, Vec<PermissionScope>>,
    /// False when the excess check was skipped (`all` toolsets).
    pub excess_checked: bool,
}

impl PermissionsValidation {
    pub fn has_issues(&self) -> bool {
        !self.missing.is_empty() || !self.excess.is_empty()
    }

    /// Render a human-readable report (empty when there are no issues).
    pub fn format_message(&self, strict: bool) -> String {
        let mut sections = Vec::new();
        if !self.missing.is_empty() {
            sections.push(self.format_missing());
        }
        if !self.excess.is_empty() {
            sections.push(self.format_excess(strict));
        }
        sections.join("\n\n")
    }

    fn format_missing(&self) -> String {
        let mut lines =
            vec!["ERROR: Missing required permissions for GitHub MCP toolsets:".to_string()];
        for (scope, level) in self.missing.iter() {
            lines.push(format!("  - {scope}: {level}"));
        }
        if !self.missing_by_toolset.is_empty() {
            lines.push(String::new());
            lines.push("Required by toolsets:".to_string());
            for (toolset, scopes) in &self.missing_by_toolset {
                let scopes: Vec<&str> = scopes.iter().map(|scope| scope.as_str()).collect();
                lines.push(format!("  - {toolset}: needs {}", scopes.join(", ")));
            }
        }
        lines.push(String::new());
        lines.push("Suggested fix: Add the following to your workflow frontmatter:".to_string());
        lines.push("permissions:".to_string());
        for (scope, level) in self.missing.iter() {
            lines.push(format!("  {scope}: {level}"));
        }
        lines.join("\n")
    }

    fn format_excess(&self, strict: bool) -> String {
        let prefix = if strict { "ERROR" } else { "WARNING" };
        let mut lines = vec![format!(
            "{prefix}: Over-provisioned permissions detected for GitHub MCP toolsets:"
        )];
        for (scope, level) in self.excess.iter() {
            lines.push(format!(
                "  - {scope}: {level} (not required by configured toolsets)"
            ));
        }
        lines.push(String::new());
        lines.push(
            "Principle of least privilege: Only grant permissions that are needed.".to_string(),
        );
        lines.push(
            "Consider removing these permissions or adjusting your toolsets configuration."
                .to_string(),
        );
        lines.join("\n")
    }
}

/// Union of the scopes the toolsets need; write only when not read-only.
///
/// Unknown toolset names are skipped.
pub fn required_permissions(toolsets: &[String], read_only: bool) -> Permissions {
    let mut required = Permissions::new();
    for name in toolsets {
        let Some(entry) = lookup_toolset(name) else {
            debug!(toolset = %name, "unknown toolset");
            continue;
        };
        required.merge(&entry.permissions(read_only));
    }
    required
}

/// Compare `granted` against the least privilege `raw_toolsets` need.
///
/// An empty toolset list has nothing to compare against and validates clean.
pub fn validate_permissions(
    raw_toolsets: &[String],
    read_only: bool,
    granted: &Permissions,
) -> PermissionsValidation {
    if raw_toolsets.iter().all(|name| name.trim().is_empty()) {
        debug!("no toolsets configured, nothing to validate");
        return PermissionsValidation::default();
    }
    let toolsets = expand_toolsets(raw_toolsets);
    debug!(toolsets = ?toolsets, read_only, "validating toolset permissions");
    let required = required_permissions(&toolsets, read_only);

    let mut missing = Permissions::new();
    let mut missing_by_toolset: BTreeMap<String, Vec<PermissionScope>> = BTreeMap::new();
    for (scope, level) in required.iter() {
        if granted.get(scope) >= level {
            continue;
        }
        missing.set(scope, level);
        for name in &toolsets {
            let Some(entry) = lookup_toolset(name) else {
                continue;
            };
            if entry.read.contains(&scope) || entry.write.contains(&scope) {
                missing_by_toolset
                    .entry(name.clone())
                    .or_default()
                    .push(scope);
            }
        }
    }

    let excess_checked = !raw_toolsets.iter().any(|name| name.trim() == "all");
    let mut excess = Permissions::new();
    if excess_checked {
        for (scope, level) in granted.iter() {
            if level > required.get(scope) {
                excess.set(scope, level);
            }
        }
    }

    PermissionsValidation {
        required,
        missing,
        excess,
        missing_by_toolset,
        excess_checked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermissionLevel as L;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    /// `issues` toolset with nothing granted needs issues write.
    #[test]
    fn missing_permissions_for_issues_toolset() {
        let result = validate_permissions(&names(&["issues"]), false, &Permissions::new());
        assert_eq!(result.missing, Permissions::new().with(S::Issues, L::Write));
        assert_eq!(
            result.missing_by_toolset.get("issues"),
            Some(&vec![S::Issues])
        );
    }

    #[test]
    fn read_only_requires_only_read() {
        let result = validate_permissions(&names(&["issues"]), true, &Permissions::new());
        assert_eq!(result.missing, Permissions::new().with(S::Issues, L::Read));
    }

    #[test]
    fn unrelated_grants_are_excess() {
        let granted = Permissions::new()
            .with(S::Contents, L::Write)
            .with(S::Issues, L::Write);
        let result = validate_permissions(&names(&["issues"]), false, &granted);
        assert!(result.missing.is_empty());
        assert_eq!(result.excess.get(S::Contents), L::Write);
        assert_eq!(result.excess.get(S::Issues), L::None);
    }

    #[test]
    fn write_over_read_requirement_is_excess() {
        let granted = Permissions::new().with(S::Issues, L::Write);
        let result = validate_permissions(&names(&["issues"]), true, &granted);
        assert_eq!(result.excess, Permissions::new().with(S::Issues, L::Write));
    }

    #[test]
    fn granted_none_counts_as_missing() {
        let granted = Permissions::new().with(S::Contents, L::None);
        let result = validate_permissions(&names(&["repos"]), true, &granted);
        assert_eq!(result.missing.get(S::Contents), L::Read);
        assert!(result.excess.is_empty());
    }

    #[test]
    fn all_skips_excess_check() {
        let granted = Permissions::write_all();
        let result = validate_permissions(&names(&["all"]), false, &granted);
        assert!(!result.excess_checked);
        assert!(result.excess.is_empty());
        assert!(result.missing.is_empty());
    }

    #[test]
    fn default_expands_and_still_checks_excess() {
        assert_eq!(
            expand_toolsets(&names(&["default", "repos", " actions "])),
            names(&["context", "repos", "issues", "pull_requests", "users", "actions"])
        );
        let granted = Permissions::new().with(S::Checks, L::Read);
        let result = validate_permissions(&names(&["default"]), true, &granted);
        assert!(result.excess_checked);
        assert_eq!(result.excess.get(S::Checks), L::Read);
    }

    #[test]
    fn overlapping_toolsets_keep_the_higher_level() {
        let read_only = required_permissions(&names(&["labels", "issues"]), true);
        assert_eq!(read_only.get(PermissionScope::Issues), L::Read);
        let writable = required_permissions(&names(&["dependabot", "code_security"]), false);
        assert_eq!(writable.get(PermissionScope::SecurityEvents), L::Write);
        let later_read = required_permissions(&names(&["code_security", "dependabot"]), false);
        assert_eq!(later_read.get(PermissionScope::SecurityEvents), L::Write);
    }

    #[test]
    fn empty_toolsets_validate_clean() {
        let granted = Permissions::new()
            .with(PermissionScope::Contents, L::Write)
            .with(PermissionScope::Issues, L::Write);
        let result = validate_permissions(&[], false, &granted);
        assert!(!result.has_issues());
        assert!(result.required.is_empty());
        assert_eq!(result.format_message(true), "");
    }

    #[test]
    fn unknown_toolsets_require_nothing() {
        let result = validate_permissions(&names(&["bogus"]), false, &Permissions::new());
        assert!(!result.has_issues());
        assert_eq!(result.format_message(false), "");
    }

    #[test]
    fn missing_message_lists_fix() {
        let result = validate_permissions(
            &names(&["issues", "labels", "repos"]),
            false,
            &Permissions::new().with(S::Contents, L::Write),
        );
        assert_eq!(
            result.format_message(false),
            [
                "ERROR: Missing required permissions for GitHub MCP toolsets:",
                "  - issues: write",
                "",
                "Required by toolsets:",
                "  - issues: needs issues",
                "  - labels: needs issues",
                "",
                "Suggested fix: Add the following to your workflow frontmatter:",
                "permissions:",
                "  issues: write",
            ]
            .join("\n")
        );
    }

    #[test]
    fn excess_message_prefix_depends_on_strict() {
        let granted = Permissions::new()
            .with(S::Issues, L::Read)
            .with(S::Actions, L::Read);
        let result = validate_permissions(&names(&["issues"]), true, &granted);
        let warning = result.format_message(false);
        assert!(warning.starts_with(
            "WARNING: Over-provisioned permissions detected for GitHub MCP toolsets:\n  - actions: read (not required by configured toolsets)"
        ));
        assert!(result.format_message(true).starts_with("ERROR: Over-provisioned"));
    }
}
