//! Shell command execution engine
//!
//! [`ShellEngine`] runs one command line through an interpreter
//! (`<shell> -c <command>`), streams the process's stdout into a bounded
//! [`OutputQueue`] line by line, and tracks the run through [`ShellStatus`].
//!
//! `execute` blocks for the whole run. Consumers that want to follow output
//! while the process is still writing take a queue handle from
//! [`ShellEngine::output`] (and optionally a [`ShellMonitor`]) before moving
//! the engine onto its own thread:
//!
//! ```no_run
//! use shellpipe_core::shell::ShellEngine;
//!
//! let mut engine = ShellEngine::new();
//! let output = engine.output();
//! let runner = std::thread::spawn(move || {
//!     let result = engine.execute(&["ls", "-l"]);
//!     (engine, result)
//! });
//! while let Some(line) = output.recv() {
//!     println!("{}", line);
//! }
//! let (_engine, result) = runner.join().unwrap();
//! result.unwrap();
//! ```

mod queue;
mod status;

pub use queue::{OutputQueue, MAX_OUTPUT_LINES};
pub use status::ShellStatus;

use crate::config::EngineConfig;
use crate::errors::ShellError;
use indexmap::IndexMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument, trace, warn};

/// Interpreter used when none is configured
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Flag telling the interpreter to run the following string as a command
const COMMAND_FLAG: &str = "-c";

/// Status and process id, shared with monitors
#[derive(Debug)]
struct RunState {
    status: AtomicU8,
    pid: AtomicU32,
}

/// Read-only view of an engine's status and process id
///
/// Obtained from [`ShellEngine::monitor`]; stays valid while the engine is
/// borrowed mutably by `execute` on another thread.
#[derive(Debug, Clone)]
pub struct ShellMonitor {
    state: Arc<RunState>,
}

impl ShellMonitor {
    /// Current lifecycle status
    pub fn status(&self) -> ShellStatus {
        ShellStatus::from_u8(self.state.status.load(Ordering::Acquire))
    }

    /// Id of the most recently spawned process, if any
    pub fn pid(&self) -> Option<u32> {
        match self.state.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Runs a command through a shell and streams its stdout
#[derive(Debug)]
pub struct ShellEngine {
    shell: String,
    working_directory: Option<PathBuf>,
    environment: IndexMap<String, String>,
    state: Arc<RunState>,
    output: OutputQueue,
}

impl ShellEngine {
    /// Create an engine using [`DEFAULT_SHELL`] with an empty output queue
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            working_directory: None,
            environment: IndexMap::new(),
            state: Arc::new(RunState {
                status: AtomicU8::new(ShellStatus::Unknown.as_u8()),
                pid: AtomicU32::new(0),
            }),
            output: OutputQueue::default(),
        }
    }

    /// Create an engine from loaded configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut engine = Self::new().with_shell(config.shell.clone());
        engine.working_directory = config.working_directory.clone();
        engine.environment = config.env.clone();
        engine
    }

    /// Set the interpreter; an empty value falls back to [`DEFAULT_SHELL`] at execution
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set working directory
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Configured interpreter
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Current lifecycle status
    pub fn status(&self) -> ShellStatus {
        self.monitor().status()
    }

    /// Id of the most recently spawned process, if any
    pub fn pid(&self) -> Option<u32> {
        self.monitor().pid()
    }

    /// Handle to the output queue
    pub fn output(&self) -> OutputQueue {
        self.output.clone()
    }

    /// Handle for observing status and pid from another thread
    pub fn monitor(&self) -> ShellMonitor {
        ShellMonitor {
            state: Arc::clone(&self.state),
        }
    }

    fn set_status(&self, next: ShellStatus) {
        let previous = ShellStatus::from_u8(self.state.status.swap(next.as_u8(), Ordering::AcqRel));
        debug_assert!(
            previous.can_advance_to(next),
            "invalid status transition {} -> {}",
            previous,
            next
        );
        debug!("Shell status {} -> {}", previous, next);
    }

    /// Join `parts` with spaces and run the result through the shell
    ///
    /// Blocks until the process has exited. Every stdout line is published to
    /// the output queue as it is read; the queue is closed when this returns.
    /// An empty command line fails without touching the status; a line of
    /// blanks is handed to the shell like any other.
    #[instrument(skip(self, parts), fields(shell = %self.shell))]
    pub fn execute<S: AsRef<str>>(&mut self, parts: &[S]) -> Result<(), ShellError> {
        let command = parts
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");

        let result = if command.is_empty() {
            Err(ShellError::EmptyCommand)
        } else {
            self.run(&command)
        };

        self.output.close();
        if let Err(ref e) = result {
            error!("Command failed: {}", e);
        }
        result
    }

    fn run(&mut self, command: &str) -> Result<(), ShellError> {
        if self.shell.is_empty() {
            self.shell = DEFAULT_SHELL.to_string();
        }

        self.output.reopen();
        self.set_status(ShellStatus::Created);

        let mut process = Command::new(&self.shell);
        process
            .arg(COMMAND_FLAG)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(ref dir) = self.working_directory {
            process.current_dir(dir);
        }
        for (key, value) in &self.environment {
            process.env(key, value);
        }

        debug!("Spawning {} {} {:?}", self.shell, COMMAND_FLAG, command);
        let mut child = process.spawn().map_err(|source| {
            self.set_status(ShellStatus::Error);
            ShellError::Spawn {
                shell: self.shell.clone(),
                source,
            }
        })?;

        self.state.pid.store(child.id(), Ordering::Release);
        self.set_status(ShellStatus::Started);

        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            self.set_status(ShellStatus::Error);
            return Err(ShellError::OutputUnavailable {
                shell: self.shell.clone(),
            });
        };

        self.set_status(ShellStatus::Running);
        let published = self.pump(BufReader::new(stdout));
        debug!("Read {} lines from pid {}", published, child.id());

        let exit_status = match child.wait() {
            Ok(status) => status,
            Err(source) => {
                self.set_status(ShellStatus::Error);
                return Err(ShellError::Wait { source });
            }
        };

        if !exit_status.success() {
            self.set_status(ShellStatus::Error);
            return Err(ShellError::Failed {
                status: exit_status.to_string(),
                code: exit_status.code(),
            });
        }

        self.set_status(ShellStatus::Exited);
        Ok(())
    }

    /// Publish every line from `reader` until end of stream or a read error
    ///
    /// A read error is published as a final line instead of being returned.
    fn pump<R: BufRead>(&self, mut reader: R) -> usize {
        let mut published = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(strip_line_ending(&buf)).into_owned();
                    trace!("stdout: {}", line);
                    self.output.publish(line);
                    published += 1;
                }
                Err(e) => {
                    warn!("Failed to read command output: {}", e);
                    self.output.publish(e.to_string());
                    published += 1;
                    break;
                }
            }
        }
        published
    }
}

impl Default for ShellEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Best-effort kill and wait for a child we can no longer drive
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill pid {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        debug!("Failed to reap pid {}: {}", child.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::io::{self, Cursor, Read};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_engine() {
        let engine = ShellEngine::new();
        assert_eq!(engine.status(), ShellStatus::Unknown);
        assert_eq!(engine.shell(), DEFAULT_SHELL);
        assert!(engine.pid().is_none());
        assert!(engine.output().is_empty());
        assert_eq!(engine.output().capacity(), MAX_OUTPUT_LINES);
    }

    #[test]
    fn test_execute_success_captures_lines_in_order() {
        let mut engine = ShellEngine::new();
        let result = engine.execute(&["printf", "'a\\nb\\nc\\n'"]);

        assert!(result.is_ok(), "unexpected error: {:?}", result);
        assert_eq!(engine.status(), ShellStatus::Exited);
        assert!(engine.pid().is_some());
        assert_eq!(engine.output().snapshot(), vec!["a", "b", "c"]);
        assert!(engine.output().is_closed());
    }

    #[test]
    fn test_empty_command_leaves_status_untouched() {
        let mut engine = ShellEngine::new();
        let empty: [&str; 0] = [];

        let err = engine.execute(&empty).unwrap_err();
        assert!(matches!(err, ShellError::EmptyCommand));
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(engine.status(), ShellStatus::Unknown);
        assert!(engine.pid().is_none());

        let err = engine.execute(&[""]).unwrap_err();
        assert!(matches!(err, ShellError::EmptyCommand));
        assert_eq!(engine.status(), ShellStatus::Unknown);
    }

    #[test]
    fn test_whitespace_command_is_run() {
        let mut engine = ShellEngine::new();
        engine.execute(&["", "  "]).unwrap();
        assert_eq!(engine.status(), ShellStatus::Exited);
        assert!(engine.pid().is_some());
        assert!(engine.output().is_empty());
    }

    #[test]
    fn test_empty_command_after_run_keeps_terminal_status() {
        let mut engine = ShellEngine::new();
        engine.execute(&["true"]).unwrap();
        assert!(engine.execute(&[""]).is_err());
        assert_eq!(engine.status(), ShellStatus::Exited);
    }

    #[test]
    fn test_nonzero_exit_is_error_with_output_kept() {
        let mut engine = ShellEngine::new();
        let err = engine.execute(&["echo out; exit 3"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Exit);
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().starts_with("command exec failed"));
        assert_eq!(engine.status(), ShellStatus::Error);
        assert_eq!(engine.output().snapshot(), vec!["out"]);
    }

    #[test]
    fn test_killed_by_signal_has_no_exit_code() {
        let mut engine = ShellEngine::new();
        let err = engine.execute(&["echo before; kill -9 $$"]).unwrap_err();

        assert!(matches!(err, ShellError::Failed { code: None, .. }));
        assert_eq!(err.kind(), ErrorKind::Exit);
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().starts_with("command exec failed"));
        assert_eq!(engine.status(), ShellStatus::Error);
        assert_eq!(engine.output().snapshot(), vec!["before"]);
    }

    #[test]
    fn test_missing_interpreter_is_spawn_error() {
        let mut engine = ShellEngine::new().with_shell("/definitely/not/a/shell");
        let err = engine.execute(&["echo", "hi"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert!(err.to_string().contains("/definitely/not/a/shell"));
        assert_eq!(engine.status(), ShellStatus::Error);
        assert!(engine.pid().is_none());
        assert!(engine.output().is_empty());
        assert!(engine.output().is_closed());
    }

    #[test]
    fn test_empty_shell_uses_default() {
        let mut engine = ShellEngine::new().with_shell("");
        engine.execute(&["echo", "ok"]).unwrap();
        assert_eq!(engine.shell(), DEFAULT_SHELL);
        assert_eq!(engine.output().snapshot(), vec!["ok"]);
    }

    #[test]
    fn test_overflow_keeps_newest_lines() {
        let mut engine = ShellEngine::new();
        engine
            .execute(&["i=1; while [ $i -le 150 ]; do echo $i; i=$((i+1)); done"])
            .unwrap();

        let expected: Vec<String> = (51..=150).map(|i| i.to_string()).collect();
        let output = engine.output();
        assert_eq!(output.len(), MAX_OUTPUT_LINES);
        assert_eq!(output.snapshot(), expected);
        assert_eq!(output.evicted(), 50);
    }

    #[test]
    fn test_final_line_without_newline_is_published() {
        let mut engine = ShellEngine::new();
        engine.execute(&["printf", "'first\\nlast'"]).unwrap();
        assert_eq!(engine.output().snapshot(), vec!["first", "last"]);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut engine = ShellEngine::new();
        engine.execute(&["printf", "'x\\r\\n'"]).unwrap();
        assert_eq!(engine.output().snapshot(), vec!["x"]);
    }

    #[test]
    fn test_stderr_is_not_captured() {
        let mut engine = ShellEngine::new();
        engine.execute(&["echo visible; echo hidden >&2"]).unwrap();
        assert_eq!(engine.output().snapshot(), vec!["visible"]);
    }

    #[test]
    fn test_working_directory_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let mut engine = ShellEngine::new()
            .with_working_directory(&canonical)
            .with_env("SHELLPIPE_TEST_VALUE", "forty-two");

        engine
            .execute(&["pwd -P; echo $SHELLPIPE_TEST_VALUE"])
            .unwrap();
        assert_eq!(
            engine.output().snapshot(),
            vec![canonical.display().to_string(), "forty-two".to_string()]
        );
    }

    #[test]
    fn test_reuse_keeps_previous_output() {
        let mut engine = ShellEngine::new();
        engine.execute(&["echo", "one"]).unwrap();
        let first_pid = engine.pid();
        engine.execute(&["echo", "two"]).unwrap();

        assert_eq!(engine.status(), ShellStatus::Exited);
        assert_eq!(engine.output().snapshot(), vec!["one", "two"]);
        assert!(engine.pid().is_some());
        assert!(first_pid.is_some());
    }

    #[test]
    fn test_concurrent_consumer_and_monitor() {
        let mut engine = ShellEngine::new();
        let output = engine.output();
        let monitor = engine.monitor();

        let runner = thread::spawn(move || {
            let result = engine.execute(&["for i in 1 2 3 4 5; do echo $i; sleep 0.05; done"]);
            (engine, result)
        });

        let watcher = thread::spawn(move || {
            let mut seen = vec![monitor.status()];
            while !monitor.status().is_terminal() {
                let status = monitor.status();
                if seen.last() != Some(&status) {
                    seen.push(status);
                }
                thread::sleep(Duration::from_millis(1));
            }
            seen.push(monitor.status());
            seen
        });

        let mut lines = Vec::new();
        while let Some(line) = output.recv() {
            lines.push(line);
        }

        let (engine, result) = runner.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(lines, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(engine.status(), ShellStatus::Exited);

        let seen = watcher.join().unwrap();
        assert!(seen.contains(&ShellStatus::Running));
        assert!(
            seen.windows(2).all(|w| rank(w[0]) <= rank(w[1])),
            "status regressed: {:?}",
            seen
        );
    }

    fn rank(status: ShellStatus) -> u8 {
        match status {
            ShellStatus::Unknown => 0,
            ShellStatus::Created => 1,
            ShellStatus::Started => 2,
            ShellStatus::Running => 3,
            _ => 4,
        }
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe went away"));
            }
            self.served = true;
            let data = b"partial\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_read_error_is_published_as_final_line() {
        let engine = ShellEngine::new();
        let published = engine.pump(BufReader::new(FailingReader { served: false }));

        assert_eq!(published, 2);
        assert_eq!(
            engine.output().snapshot(),
            vec!["partial".to_string(), "pipe went away".to_string()]
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let engine = ShellEngine::new();
        engine.pump(Cursor::new(b"ok\xff\n".to_vec()));
        assert_eq!(engine.output().snapshot(), vec!["ok\u{fffd}"]);
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            shell: "/bin/bash".to_string(),
            working_directory: Some(PathBuf::from("/tmp")),
            env: IndexMap::from([("A".to_string(), "1".to_string())]),
        };
        let engine = ShellEngine::from_config(&config);
        assert_eq!(engine.shell(), "/bin/bash");
        assert_eq!(engine.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(engine.environment.get("A").map(String::as_str), Some("1"));
        assert_eq!(engine.status(), ShellStatus::Unknown);
    }
}
