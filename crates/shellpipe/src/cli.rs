use crate::commands::run::{execute_run, RunArgs, RunOutput};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use shellpipe_core::logging;
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Stream lines as they are produced
    Text,
    /// Single JSON summary after completion
    Json,
}

impl From<OutputFormat> for RunOutput {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => RunOutput::Text,
            OutputFormat::Json => RunOutput::Json,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// shellpipe subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command through a shell and stream its stdout
    Run {
        /// Interpreter to run the command with (overrides config and SHELLPIPE_SHELL)
        #[arg(long, value_name = "PATH")]
        shell: Option<String>,
        /// Working directory for the command
        #[arg(long, value_name = "PATH")]
        workdir: Option<PathBuf>,
        /// Environment variable for the command (format: NAME=value, can be repeated)
        #[arg(long, value_name = "NAME=VALUE")]
        env: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
        /// Command tokens; joined with single spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Run shell commands with bounded, streamed output
#[derive(Debug, Parser)]
#[command(name = "shellpipe", version)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via SHELLPIPE_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialize logging, then run the selected subcommand
    pub async fn dispatch(self) -> Result<()> {
        let log_format = self.log_format.map(|format| match format {
            LogFormat::Text => logging::LogFormat::Text,
            LogFormat::Json => logging::LogFormat::Json,
        });

        if std::env::var_os("SHELLPIPE_LOG").is_none() && std::env::var_os("RUST_LOG").is_none()
        {
            let level = self.log_level.as_str();
            std::env::set_var(
                "RUST_LOG",
                format!("shellpipe={},shellpipe_core={}", level, level),
            );
        }
        logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        match self.command {
            Commands::Run {
                shell,
                workdir,
                env,
                output,
                command,
            } => {
                execute_run(RunArgs {
                    config_path: self.config,
                    shell,
                    workdir,
                    env,
                    output: output.into(),
                    command,
                })
                .await
            }
        }
    }
}
