//! Error taxonomy for compilation.
//!
//! Every error aborts the compile; no partial graph is emitted.

use std::fmt;

/// Coarse classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    ManifestViolation,
    GraphIntegrityError,
    PermissionError,
    UnknownJobType,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::ManifestViolation => "manifest violation",
            ErrorKind::GraphIntegrityError => "graph integrity error",
            ErrorKind::PermissionError => "permission error",
            ErrorKind::UnknownJobType => "unknown job type",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Mutually exclusive or out-of-range settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A handler emitted an undeclared env var or omitted a required one.
    #[error("manifest violation in '{job_type}': {message}")]
    ManifestViolation { job_type: String, message: String },

    /// Cycle, dangling dependency, or duplicate job name.
    #[error("job graph integrity error: {message}")]
    GraphIntegrity { message: String, jobs: Vec<String> },

    /// Missing permissions, or excess permissions under strict mode.
    #[error("{0}")]
    Permission(String),

    #[error("unknown safe output job type: {0}")]
    UnknownJobType(String),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Configuration(_) => ErrorKind::ConfigurationError,
            CompileError::ManifestViolation { .. } => ErrorKind::ManifestViolation,
            CompileError::GraphIntegrity { .. } => ErrorKind::GraphIntegrityError,
            CompileError::Permission(_) => ErrorKind::PermissionError,
            CompileError::UnknownJobType(_) => ErrorKind::UnknownJobType,
        }
    }

    pub(crate) fn graph(message: impl Into<String>, jobs: &[&str]) -> Self {
        CompileError::GraphIntegrity {
            message: message.into(),
            jobs: jobs.iter().map(|job| job.to_string()).collect(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        CompileError::Configuration(message.into())
    }
}
