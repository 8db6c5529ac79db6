//! Safe-output workflow compiler CLI.
//!
//! Compiles a workflow TOML file into a job graph (JSON), and exposes the
//! env-var manifest and the toolset permission validator on their own.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use compiler::compile::{CompileRequest, run_compile};
use compiler::core::env_manifest::{self, JobEnvManifest};
use compiler::core::error::CompileError;
use compiler::core::permission_validator::validate_permissions;
use compiler::core::permissions::{PermissionLevel, PermissionScope, Permissions};
use compiler::exit_codes;
use compiler::io::config::{CompilerSettings, write_settings};
use compiler::io::graph_store::render_graph;
use compiler::logging;

#[derive(Parser)]
#[command(
    name = "compiler",
    version,
    about = "Compile agentic workflows into least-privilege safe-output job graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a compiler settings file with the defaults if missing.
    Init {
        /// Settings file to create.
        #[arg(default_value = "compiler.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Compile a workflow file into a job graph.
    Compile {
        /// Workflow TOML file.
        workflow: PathBuf,
        /// Compiler settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the graph JSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Treat over-provisioned permissions as errors.
        #[arg(long)]
        strict: bool,
        /// Print a Mermaid diagram of the job dependencies.
        #[arg(long)]
        mermaid: bool,
    },
    /// Print the env-var manifest for one job type, or all of them.
    Manifest {
        job_type: Option<String>,
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check granted permissions against GitHub toolsets.
    Permissions {
        /// Comma-separated toolsets (`default` and `all` expand).
        #[arg(long, value_delimiter = ',', required = true)]
        toolsets: Vec<String>,
        #[arg(long)]
        read_only: bool,
        /// Granted permission as `scope=level`; repeatable.
        #[arg(long = "grant", value_parser = parse_grant)]
        grants: Vec<Grant>,
        #[arg(long)]
        strict: bool,
    },
}

/// One `--grant scope=level` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grant {
    scope: PermissionScope,
    level: PermissionLevel,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

/// Compilation rejections get their own code; everything else is invalid input.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<CompileError>().is_some())
    {
        exit_codes::REJECTED
    } else {
        exit_codes::INVALID
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { path, force } => cmd_init(&path, force),
        Command::Compile {
            workflow,
            config,
            output,
            strict,
            mermaid,
        } => {
            let request = CompileRequest {
                workflow_path: &workflow,
                config_path: config.as_deref(),
                output_path: output.as_deref(),
                strict,
            };
            cmd_compile(request, mermaid)
        }
        Command::Manifest { job_type, json } => cmd_manifest(job_type.as_deref(), json),
        Command::Permissions {
            toolsets,
            read_only,
            grants,
            strict,
        } => cmd_permissions(&toolsets, read_only, grants, strict),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists; pass --force to overwrite", path.display());
        return Ok(exit_codes::OK);
    }
    write_settings(path, &CompilerSettings::default())?;
    Ok(exit_codes::OK)
}

fn cmd_compile(request: CompileRequest<'_>, mermaid: bool) -> Result<i32> {
    let outcome = run_compile(&request)?;
    for warning in &outcome.compiled.warnings {
        eprintln!("{warning}");
    }
    if mermaid {
        println!("{}", outcome.compiled.graph.mermaid());
    } else if request.output_path.is_none() {
        print!("{}", render_graph(&outcome.compiled.graph)?);
    }
    Ok(exit_codes::OK)
}

fn cmd_manifest(job_type: Option<&str>, json: bool) -> Result<i32> {
    let manifests: Vec<&JobEnvManifest> = match job_type {
        Some(job_type) => vec![env_manifest::job_manifest(job_type)?],
        None => env_manifest::get_manifest().values().collect(),
    };
    if json {
        let payload = serde_json::to_string_pretty(&manifests).context("serialize manifest")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }
    for (idx, manifest) in manifests.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        println!("{}: {}", manifest.job_type, manifest.description);
        for entry in &manifest.env_vars {
            let marker = if entry.required { "required" } else { "optional" };
            match entry.default_value {
                Some(default) => println!(
                    "  {} ({marker}, default {default}): {}",
                    entry.name, entry.description
                ),
                None => println!("  {} ({marker}): {}", entry.name, entry.description),
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_permissions(
    toolsets: &[String],
    read_only: bool,
    grants: Vec<Grant>,
    strict: bool,
) -> Result<i32> {
    let granted: Permissions = grants
        .into_iter()
        .map(|grant| (grant.scope, grant.level))
        .collect();
    let result = validate_permissions(toolsets, read_only, &granted);
    if !result.missing.is_empty() || (strict && !result.excess.is_empty()) {
        return Err(CompileError::Permission(result.format_message(strict)).into());
    }
    if result.has_issues() {
        eprintln!("{}", result.format_message(false));
    }
    println!("permissions:");
    for (scope, level) in result.required.iter() {
        println!("  {scope}: {level}");
    }
    Ok(exit_codes::OK)
}

fn parse_grant(raw: &str) -> Result<Grant> {
    let (scope, level) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected scope=level, got '{raw}'"))?;
    let scope = scope.trim().parse::<PermissionScope>().map_err(|err| anyhow!(err))?;
    let level = level.trim().parse::<PermissionLevel>().map_err(|err| anyhow!(err))?;
    Ok(Grant { scope, level })
}
