//! Stable exit codes for compiler CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Input could not be read, parsed, or validated against the schema.
pub const INVALID: i32 = 1;
/// Compilation rejected the workflow (configuration, manifest, permission,
/// or job graph error).
pub const REJECTED: i32 = 2;
