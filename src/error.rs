//! Error types for cmdexec.

use std::time::Duration;

use thiserror::Error;

use crate::execution::{CommandFailure, ProcessState};

/// Main error type for command execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command violates a static constraint (e.g. no program given).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The rendered command is longer than the configured maximum.
    #[error("command is {length} characters long, exceeding the maximum of {max}: {command}")]
    TooLong {
        command: String,
        length: usize,
        max: usize,
    },

    /// The OS refused to create the process.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited with a non-zero status that was not permitted.
    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    /// Infrastructure failure while executing a command.
    #[error("failed to execute {command}")]
    Execution {
        command: String,
        #[source]
        source: Box<ExecError>,
    },

    /// The deadline elapsed before the command completed.
    #[error("command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: ProcessState, to: ProcessState },

    /// Output was requested from a process that was never started.
    #[error("process has not been started")]
    NotStarted,

    /// Output was requested a second time from the same process.
    #[error("output of {0} was already gathered")]
    AlreadyGathered(crate::execution::InvocationId),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl ExecError {
    /// Captured output carried by the error, if any.
    ///
    /// Only [`ExecError::CommandFailed`] carries output, either directly or
    /// wrapped inside [`ExecError::Execution`].
    pub fn output(&self) -> Option<&[String]> {
        match self {
            Self::CommandFailed(failure) => Some(&failure.output),
            Self::Execution { source, .. } => source.output(),
            _ => None,
        }
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the process ran and exited with a disallowed status.
    pub fn is_command_failed(&self) -> bool {
        matches!(self, Self::CommandFailed(_))
    }

    /// Whether the error happened before any process was spawned.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidCommand(_) | Self::TooLong { .. })
    }
}

/// Convenience Result type for cmdexec operations.
pub type Result<T> = std::result::Result<T, ExecError>;
