//! # cmdexec
//!
//! Out-of-process command execution with merged output capture.
//!
//! This crate launches external programs, captures their merged
//! stdout/stderr stream line by line, optionally tees every line to a sink
//! as it arrives, and enforces deadlines by destroying the process.
//!
//! ## Features
//!
//! - **Immutable commands**: build once with a fluent builder, run many times
//! - **Structured failures**: a non-zero exit keeps every captured line
//! - **Timeouts**: one dedicated worker per invocation, no leaked children
//! - **Async support**: the same guarantees from inside a tokio runtime
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//! use cmdexec::{Command, ExecError};
//!
//! fn main() -> cmdexec::Result<()> {
//!     cmdexec::logging::try_init().ok();
//!
//!     let command = Command::builder()
//!         .args(["cargo", "test"])
//!         .env("RUST_BACKTRACE", "1")
//!         .tee(Arc::new(Mutex::new(std::io::stdout())))
//!         .build()?;
//!
//!     match command.execute_with_timeout(Duration::from_secs(600)) {
//!         Ok(lines) => println!("{} lines of output", lines.len()),
//!         Err(ExecError::CommandFailed(failure)) => {
//!             eprintln!("tests failed with status {}", failure.exit_code);
//!         }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;

// Re-export commonly used types
pub use error::{ExecError, Result};
pub use execution::{
    Command, CommandBuilder, CommandFailure, Destroyed, ExecutionResult, LineSink, PendingOutput,
    Process, ProcessState,
};
