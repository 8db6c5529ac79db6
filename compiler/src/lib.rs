//! Safe-output workflow compiler.
//!
//! Compiles an agentic workflow description into a CI job graph in which the
//! agent job runs read-only and every write to GitHub happens in a separate,
//! least-privilege safe-output job gated by a threat detection job.
//!
//! - **[`core`]**: Pure, deterministic logic (env manifest, permission
//!   validation, handlers, threat detection, graph compilation). No I/O.
//! - **[`io`]**: Reading workflows and settings, writing compiled graphs.
//!
//! [`compile`] coordinates the two for the CLI.

pub mod compile;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod job;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
