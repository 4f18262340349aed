//! Execution result types.

use std::fmt;
use std::time::Duration;

use crate::error::ExecError;

/// Outcome of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Captured lines of the merged stdout/stderr stream, in emission order.
    pub lines: Vec<String>,
    /// Exit status of the process. Signal deaths report `128 + signal`.
    pub exit_code: i32,
    /// Time from spawn until the exit status was observed.
    pub duration: Duration,
    /// Whether non-zero exit statuses count as success.
    pub permit_non_zero_exit: bool,
}

impl ExecutionResult {
    /// Create a new execution result.
    pub fn new(lines: Vec<String>, exit_code: i32, duration: Duration) -> Self {
        Self {
            lines,
            exit_code,
            duration,
            permit_non_zero_exit: false,
        }
    }

    /// Set whether non-zero exit statuses are permitted.
    pub fn with_permit_non_zero_exit(mut self, permit: bool) -> Self {
        self.permit_non_zero_exit = permit;
        self
    }

    /// Check if the invocation counts as successful.
    pub fn success(&self) -> bool {
        self.exit_code == 0 || self.permit_non_zero_exit
    }

    /// Check if the invocation counts as failed.
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// Get output lines.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Get output joined with newlines, trimmed.
    pub fn output_trimmed(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }

    /// Classify the result, returning the lines on success.
    ///
    /// A failed result becomes [`ExecError::CommandFailed`] carrying `args`
    /// and every captured line.
    pub fn into_output(self, args: &[String]) -> Result<Vec<String>, ExecError> {
        if self.success() {
            Ok(self.lines)
        } else {
            Err(CommandFailure::new(args.to_vec(), self.lines, self.exit_code).into())
        }
    }
}

/// A process that ran to completion with a disallowed exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// Program and arguments as they were invoked.
    pub args: Vec<String>,
    /// Everything the process printed.
    pub output: Vec<String>,
    /// Exit status of the process.
    pub exit_code: i32,
}

impl CommandFailure {
    /// Create a new command failure.
    pub fn new(args: Vec<String>, output: Vec<String>, exit_code: i32) -> Self {
        Self {
            args,
            output,
            exit_code,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command failed with exit status {}: {}",
            self.exit_code,
            self.args.join(" ")
        )?;
        for line in &self.output {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {}
