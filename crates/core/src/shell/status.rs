//! Lifecycle status of a shell execution
//!
//! A run moves strictly forward through
//! `unknown -> created -> started -> running -> {exited, error}`.
//! `created` and `started` may also fall straight into `error` when the
//! process cannot be spawned. `wait` is part of the vocabulary but no
//! transition ever enters it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a [`ShellEngine`](super::ShellEngine) run
///
/// The numeric values are stable and may be compared against by external callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ShellStatus {
    /// Execution has begun; the process has not been spawned yet
    Created = 1,
    /// The process has been spawned
    Started = 2,
    /// Output is being read from the process
    Running = 3,
    /// The process exited successfully
    Exited = 4,
    /// Spawning, waiting or the process itself failed
    Error = 5,
    /// No execution has been attempted
    #[default]
    Unknown = 6,
    /// Reserved; never entered
    Wait = 7,
}

impl ShellStatus {
    /// Get the status name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellStatus::Created => "created",
            ShellStatus::Started => "started",
            ShellStatus::Running => "running",
            ShellStatus::Exited => "exited",
            ShellStatus::Error => "error",
            ShellStatus::Unknown => "unknown",
            ShellStatus::Wait => "wait",
        }
    }

    /// Stable numeric value of this status
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Map a numeric value back to a status
    ///
    /// Unrecognized values map to [`ShellStatus::Unknown`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ShellStatus::Created,
            2 => ShellStatus::Started,
            3 => ShellStatus::Running,
            4 => ShellStatus::Exited,
            5 => ShellStatus::Error,
            7 => ShellStatus::Wait,
            _ => ShellStatus::Unknown,
        }
    }

    /// Returns whether no further transition happens within the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShellStatus::Exited | ShellStatus::Error)
    }

    /// Returns whether `next` is an edge of the transition graph.
    ///
    /// A terminal status may advance to `created`, which is how a reused
    /// engine starts its next run.
    pub fn can_advance_to(&self, next: ShellStatus) -> bool {
        use ShellStatus::*;
        matches!(
            (self, next),
            (Unknown, Created)
                | (Created, Started)
                | (Created, Error)
                | (Started, Running)
                | (Started, Error)
                | (Running, Exited)
                | (Running, Error)
                | (Exited, Created)
                | (Error, Created)
        )
    }
}

impl fmt::Display for ShellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ShellStatus> for u8 {
    fn from(status: ShellStatus) -> Self {
        status.as_u8()
    }
}
