//! GitHub Actions permission scopes and levels.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// A GitHub Actions `permissions:` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionScope {
    Actions,
    Attestations,
    Checks,
    Contents,
    Deployments,
    Discussions,
    IdToken,
    Issues,
    Models,
    OrganizationProjects,
    Packages,
    Pages,
    PullRequests,
    RepositoryProjects,
    SecurityEvents,
    Statuses,
}

impl PermissionScope {
    pub const ALL: [PermissionScope; 16] = [
        PermissionScope::Actions,
        PermissionScope::Attestations,
        PermissionScope::Checks,
        PermissionScope::Contents,
        PermissionScope::Deployments,
        PermissionScope::Discussions,
        PermissionScope::IdToken,
        PermissionScope::Issues,
        PermissionScope::Models,
        PermissionScope::OrganizationProjects,
        PermissionScope::Packages,
        PermissionScope::Pages,
        PermissionScope::PullRequests,
        PermissionScope::RepositoryProjects,
        PermissionScope::SecurityEvents,
        PermissionScope::Statuses,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionScope::Actions => "actions",
            PermissionScope::Attestations => "attestations",
            PermissionScope::Checks => "checks",
            PermissionScope::Contents => "contents",
            PermissionScope::Deployments => "deployments",
            PermissionScope::Discussions => "discussions",
            PermissionScope::IdToken => "id-token",
            PermissionScope::Issues => "issues",
            PermissionScope::Models => "models",
            PermissionScope::OrganizationProjects => "organization-projects",
            PermissionScope::Packages => "packages",
            PermissionScope::Pages => "pages",
            PermissionScope::PullRequests => "pull-requests",
            PermissionScope::RepositoryProjects => "repository-projects",
            PermissionScope::SecurityEvents => "security-events",
            PermissionScope::Statuses => "statuses",
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionScope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| format!("unknown permission scope '{s}'"))
    }
}

/// Access level, ordered `none < read < write`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None,
    Read,
    Write,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PermissionLevel::None),
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            other => Err(format!("unknown permission level '{other}'")),
        }
    }
}

/// Scope to level map for one job.
///
/// Scopes absent from the map are treated as `none`. Deserializes from a
/// table or from the `read-all` / `write-all` shorthands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<PermissionScope, PermissionLevel>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_all() -> Self {
        Self::uniform(PermissionLevel::Read)
    }

    pub fn write_all() -> Self {
        Self::uniform(PermissionLevel::Write)
    }

    fn uniform(level: PermissionLevel) -> Self {
        Self(
            PermissionScope::ALL
                .into_iter()
                .map(|scope| (scope, level))
                .collect(),
        )
    }

    /// Builder-style setter.
    pub fn with(mut self, scope: PermissionScope, level: PermissionLevel) -> Self {
        self.set(scope, level);
        self
    }

    pub fn set(&mut self, scope: PermissionScope, level: PermissionLevel) {
        self.0.insert(scope, level);
    }

    pub fn get(&self, scope: PermissionScope) -> PermissionLevel {
        self.0.get(&scope).copied().unwrap_or_default()
    }

    /// Raise each scope to the higher of the two levels.
    pub fn merge(&mut self, other: &Permissions) {
        for (scope, level) in other.iter() {
            if level > self.get(scope) {
                self.set(scope, level);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PermissionScope, PermissionLevel)> + '_ {
        self.0.iter().map(|(scope, level)| (*scope, *level))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when no scope is granted `write`.
    pub fn is_read_only(&self) -> bool {
        self.iter().all(|(_, level)| level < PermissionLevel::Write)
    }
}

impl FromIterator<(PermissionScope, PermissionLevel)> for Permissions {
    fn from_iter<I: IntoIterator<Item = (PermissionScope, PermissionLevel)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Shorthand(String),
            Map(BTreeMap<PermissionScope, PermissionLevel>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Map(map) => Ok(Permissions(map)),
            Raw::Shorthand(value) => match value.as_str() {
                "read-all" => Ok(Permissions::read_all()),
                "write-all" => Ok(Permissions::write_all()),
                other => Err(de::Error::custom(format!(
                    "invalid permissions shorthand '{other}' (expected read-all or write-all)"
                ))),
            },
        }
    }
}
