//! Host command execution.
//!
//! The backend shells out for exactly one thing: querying the host's
//! neighbor-discovery (ARP) table during IP resolution. The runner is a
//! trait so tests can substitute canned output.

use crate::error::{Error, Result};
use std::process::{Command, Stdio};

/// Runs a host-level command and captures its standard output as lines.
pub trait CommandRunner {
    /// Run `argv` to completion, blocking, and return captured stdout lines.
    ///
    /// When `silent` is set the child's stderr is discarded instead of
    /// inherited.
    fn run(&self, argv: &[&str], silent: bool) -> Result<Vec<String>>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default)]
pub struct NativeRunner;

impl NativeRunner {
    /// Create a new native runner.
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for NativeRunner {
    fn run(&self, argv: &[&str], silent: bool) -> Result<Vec<String>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::command_failed("<empty>", "empty argument vector"))?;

        let stderr = if silent {
            Stdio::null()
        } else {
            Stdio::inherit()
        };

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(stderr)
            .output()
            .map_err(|e| Error::command_failed(*program, e.to_string()))?;

        if !output.status.success() {
            return Err(Error::command_failed(
                *program,
                format!("exited with {}", output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_runner_captures_stdout_lines() {
        let runner = NativeRunner::new();
        let lines = runner.run(&["echo", "one"], true).unwrap();
        assert_eq!(lines, vec!["one".to_string()]);
    }

    #[test]
    fn test_native_runner_empty_argv_fails() {
        let runner = NativeRunner::new();
        assert!(runner.run(&[], true).is_err());
    }

    #[test]
    fn test_native_runner_missing_program_fails() {
        let runner = NativeRunner::new();
        let err = runner.run(&["vmlab-does-not-exist"], true).unwrap_err();
        assert!(err.to_string().contains("vmlab-does-not-exist"));
    }
}
