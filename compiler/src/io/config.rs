//! Compiler settings stored in `compiler.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::compiler::CompileOptions;
use crate::core::threat_detection::DEFAULT_DETECTION_COMMAND;

/// Compiler settings (TOML, kebab-case keys).
///
/// These apply to every workflow compiled with them. A workflow's own
/// `runs-on`, `timeout-minutes`, and `strict` take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompilerSettings {
    /// Treat over-provisioned permissions as errors.
    pub strict: bool,

    /// Runner label for every emitted job.
    pub runs_on: String,

    /// Timeout of each safe-output job.
    pub safe_output_timeout_minutes: u32,

    /// Agent job timeout when the workflow does not set one.
    pub agent_timeout_minutes: u32,

    /// Command the detection job runs with the rendered prompt appended.
    pub detection_command: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        let options = CompileOptions::default();
        Self {
            strict: options.strict,
            runs_on: options.runs_on,
            safe_output_timeout_minutes: options.safe_output_timeout_minutes,
            agent_timeout_minutes: options.agent_timeout_minutes,
            detection_command: DEFAULT_DETECTION_COMMAND.to_string(),
        }
    }
}

impl CompilerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.runs_on.trim().is_empty() {
            return Err(anyhow!("runs-on must be a non-empty string"));
        }
        if self.safe_output_timeout_minutes == 0 {
            return Err(anyhow!("safe-output-timeout-minutes must be > 0"));
        }
        if self.agent_timeout_minutes == 0 {
            return Err(anyhow!("agent-timeout-minutes must be > 0"));
        }
        if self.detection_command.trim().is_empty() {
            return Err(anyhow!("detection-command must be a non-empty string"));
        }
        Ok(())
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            strict: self.strict,
            runs_on: self.runs_on.clone(),
            safe_output_timeout_minutes: self.safe_output_timeout_minutes,
            agent_timeout_minutes: self.agent_timeout_minutes,
        }
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `CompilerSettings::default()`.
pub fn load_settings(path: &Path) -> Result<CompilerSettings> {
    if !path.exists() {
        let settings = CompilerSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: CompilerSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &CompilerSettings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
