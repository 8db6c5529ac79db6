//! GitHub Actions `if:` condition builder.
//!
//! Conditions are assembled as a small tree and rendered once, so callers can
//! AND extra gates onto a handler's condition without string surgery.

use std::fmt;

use crate::core::types::SafeOutputType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Opaque expression text, rendered verbatim.
    Raw(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn raw(text: impl Into<String>) -> Self {
        Expr::Raw(text.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    /// Conjunction; nested conjunctions are flattened.
    pub fn and(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for item in items {
            match item {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        single_or(flat, Expr::And)
    }

    /// Disjunction; nested disjunctions are flattened.
    pub fn or(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for item in items {
            match item {
                Expr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        single_or(flat, Expr::Or)
    }

    /// `self && other`.
    pub fn and_also(self, other: Expr) -> Self {
        Expr::and([self, other])
    }

    fn is_compound(&self) -> bool {
        matches!(self, Expr::And(_) | Expr::Or(_))
    }
}

fn single_or(mut items: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Raw(text) => f.write_str(text),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Raw(text) if !text.contains(' ') => write!(f, "!{text}"),
                other => write!(f, "!({other})"),
            },
            Expr::And(items) => write_joined(f, items, " && "),
            Expr::Or(items) => write_joined(f, items, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(sep)?;
        }
        if item.is_compound() {
            write!(f, "({item})")?;
        } else {
            write!(f, "{item}")?;
        }
    }
    Ok(())
}

pub fn agent_not_skipped() -> Expr {
    Expr::raw("needs.agent.result != 'skipped'")
}

/// `contains(needs.agent.outputs.output_types, '<type>')`.
pub fn output_type_present(kind: SafeOutputType) -> Expr {
    Expr::raw(format!(
        "contains(needs.agent.outputs.output_types, '{kind}')"
    ))
}

/// Same check for a custom safe-output job, keyed by job name.
pub fn output_name_present(name: &str) -> Expr {
    Expr::raw(format!(
        "contains(needs.agent.outputs.output_types, '{name}')"
    ))
}

/// Base gate for a handler job.
///
/// With `min > 0` the type-present clause is dropped so the job still runs
/// (and can enforce the floor) when the agent emitted nothing.
pub fn safe_output_condition(kind: SafeOutputType, min: u32) -> Expr {
    let base = Expr::and([Expr::raw("!cancelled()"), agent_not_skipped()]);
    if min > 0 {
        return base;
    }
    base.and_also(output_type_present(kind))
}

pub fn detection_succeeded() -> Expr {
    Expr::raw("needs.detection.outputs.success == 'true'")
}

/// Run when the triggering event is an issue or a pull request.
pub fn triggered_by_issue_or_pr() -> Expr {
    Expr::or([
        Expr::raw("github.event.issue.number"),
        Expr::raw("github.event.pull_request.number"),
    ])
}

/// Run when the triggering event is a pull request (or a comment on one).
pub fn triggered_by_pr() -> Expr {
    Expr::or([
        Expr::raw("github.event.pull_request.number"),
        Expr::raw("github.event.issue.pull_request"),
    ])
}

/// Gate for the terminal conclusion job.
pub fn conclusion_condition(own_update_paths: &[SafeOutputType]) -> Expr {
    let mut items = vec![Expr::raw("always()"), agent_not_skipped()];
    items.extend(
        own_update_paths
            .iter()
            .map(|kind| Expr::not(output_type_present(*kind))),
    );
    Expr::and(items)
}
