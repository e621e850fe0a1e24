//! Run command implementation
//!
//! Runs one command line through the execution engine on a blocking task
//! while a second task drains the engine's output queue.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use shellpipe_core::config::{ConfigLoader, EngineConfig};
use shellpipe_core::errors::{InternalError, ShellpipeError};
use shellpipe_core::shell::{OutputQueue, ShellEngine, ShellStatus};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// How run results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutput {
    /// Stream each line as it is drained
    Text,
    /// Print a single JSON summary once the command has finished
    Json,
}

/// Arguments for the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Configuration file path
    pub config_path: Option<PathBuf>,
    /// Interpreter overriding the configured one
    pub shell: Option<String>,
    /// Working directory overriding the configured one
    pub workdir: Option<PathBuf>,
    /// Extra environment variables (NAME=VALUE format)
    pub env: Vec<String>,
    /// Output mode
    pub output: RunOutput,
    /// Command tokens, joined with spaces by the engine
    pub command: Vec<String>,
}

/// JSON document printed by `--output json`
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub status: ShellStatus,
    pub pid: Option<u32>,
    pub lines: Vec<String>,
    pub error: Option<String>,
}

/// Split a `NAME=VALUE` pair
pub(crate) fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(anyhow!(
            "Invalid environment variable '{}': expected NAME=VALUE",
            pair
        )),
    }
}

/// Build the effective engine configuration
///
/// Precedence: CLI flags > environment variables > config file > defaults.
pub(crate) fn resolve_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config_path {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => EngineConfig::default(),
    };
    ConfigLoader::apply_env_overrides(&mut config);

    if let Some(shell) = &args.shell {
        config.shell = shell.clone();
    }
    if let Some(dir) = &args.workdir {
        config.working_directory = Some(dir.clone());
    }
    for pair in &args.env {
        let (name, value) = parse_env_pair(pair)?;
        config.env.insert(name, value);
    }

    ConfigLoader::validate_config(&config)?;
    Ok(config)
}

/// Write lines to stdout as they arrive until the run finishes
fn stream_output(output: &OutputQueue) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    while let Some(line) = output.recv() {
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }
    Ok(())
}

fn task_failure(e: tokio::task::JoinError) -> ShellpipeError {
    InternalError::Generic {
        message: format!("background task failed: {}", e),
    }
    .into()
}

/// Execute the run command
#[instrument(skip(args), fields(output = ?args.output))]
pub async fn execute_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    debug!("Effective engine configuration: {:?}", config);

    let mut engine = ShellEngine::from_config(&config);
    let output = engine.output();
    let command = args.command.clone();

    let runner = tokio::task::spawn_blocking(move || {
        let result = engine.execute(&command);
        (engine, result)
    });
    // JSON mode reports whatever the queue retained once the run is over
    let streamer = (args.output == RunOutput::Text).then(|| {
        let output = output.clone();
        tokio::task::spawn_blocking(move || stream_output(&output))
    });

    let (engine, result) = runner.await.map_err(task_failure)?;
    if let Some(streamer) = streamer {
        streamer
            .await
            .map_err(task_failure)?
            .context("Failed to write command output")?;
    }

    info!(
        "Command finished with status {} (pid {:?})",
        engine.status(),
        engine.pid()
    );

    if args.output == RunOutput::Json {
        let summary = RunSummary {
            status: engine.status(),
            pid: engine.pid(),
            lines: output.drain(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    result.map_err(ShellpipeError::from)?;
    Ok(())
}
