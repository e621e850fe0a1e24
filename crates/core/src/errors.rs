//! Error types and handling
//!
//! Errors are grouped into domain enums (shell execution, configuration,
//! internal) that are wrapped in the top-level [`ShellpipeError`] for
//! unified handling by callers such as the CLI.

use thiserror::Error;

/// Broad category of a [`ShellError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The command itself was unusable
    Input,
    /// The process could not be started or its output could not be attached
    Spawn,
    /// The process ran but waiting failed or it did not exit successfully
    Exit,
}

/// Shell execution errors
#[derive(Error, Debug)]
pub enum ShellError {
    /// The joined command line was empty
    #[error("cmd is empty")]
    EmptyCommand,

    /// The interpreter process could not be spawned
    #[error("Failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    /// The spawned process exposed no stdout handle
    #[error("Failed to attach to stdout of {shell}")]
    OutputUnavailable { shell: String },

    /// Waiting for the process to terminate failed
    #[error("Failed to wait for command: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully
    #[error("command exec failed: {status}")]
    Failed { status: String, code: Option<i32> },
}

impl ShellError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::EmptyCommand => ErrorKind::Input,
            ShellError::Spawn { .. } | ShellError::OutputUnavailable { .. } => ErrorKind::Spawn,
            ShellError::Wait { .. } | ShellError::Failed { .. } => ErrorKind::Exit,
        }
    }

    /// Exit code of the process, when it exited with one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShellError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Internal/generic fallback errors
#[derive(Error, Debug)]
pub enum InternalError {
    /// Generic internal error
    #[error("Internal error: {message}")]
    Generic { message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ShellpipeError {
    /// Shell execution errors
    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal/generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

/// Convenience type alias for Results with ShellpipeError
pub type Result<T> = std::result::Result<T, ShellpipeError>;
