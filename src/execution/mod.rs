//! Command execution engine.
//!
//! This module provides out-of-process command execution:
//! - Immutable command descriptions built with [`CommandBuilder`]
//! - Merged stdout/stderr capture, line by line
//! - Live tee sinks and a native-output mirror
//! - Synchronous, deadline-bounded, and background execution
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cmdexec::execution::Command;
//!
//! let lines = Command::builder()
//!     .args(["git", "status", "--short"])
//!     .working_dir("/src/project")
//!     .build()?
//!     .execute_with_timeout(Duration::from_secs(60))?;
//! println!("{} changed files", lines.len());
//! # Ok::<(), cmdexec::ExecError>(())
//! ```

mod command;
mod executor;
mod id;
mod pipe;
mod process;
mod result;
mod sink;
mod state;

pub use command::{Command, CommandBuilder};
pub use executor::{execute_simple, PendingOutput};
pub use id::InvocationId;
pub use process::{Destroyed, Process};
pub use result::{CommandFailure, ExecutionResult};
pub use sink::{LineSink, NATIVE_OUTPUT_TARGET};
pub use state::ProcessState;
