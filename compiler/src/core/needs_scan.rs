//! Detect implicit job dependencies from `needs.<job>.` references.
//!
//! This is a textual heuristic: a reference inside a string literal or a
//! comment still counts. Only names of declared custom jobs are reported.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static NEEDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"needs\.([A-Za-z_][A-Za-z0-9_-]*)\.").unwrap());

/// Custom jobs referenced by `texts`, excluding `self_name`.
pub fn referenced_jobs<'a>(
    texts: impl IntoIterator<Item = &'a str>,
    custom_jobs: &BTreeSet<String>,
    self_name: &str,
) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for text in texts {
        for caps in NEEDS_RE.captures_iter(text) {
            let name = &caps[1];
            if name != self_name && custom_jobs.contains(name) {
                found.insert(name.to_string());
            }
        }
    }
    found
}
