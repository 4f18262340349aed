//! Command execution engine.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::command::Command;
use super::id::InvocationId;
use super::process::{Destroyed, Process};
use crate::error::ExecError;
use crate::Result;

impl Command {
    /// Create a fresh, unstarted process for this command.
    pub fn process(&self) -> Process {
        Process::new(self.clone())
    }

    /// Spawn a fresh process for this command.
    pub fn start(&self) -> Result<Process> {
        let process = self.process();
        process.start()?;
        Ok(process)
    }

    /// Run the command and block until it exits.
    ///
    /// Returns the captured lines. A disallowed exit status surfaces as
    /// [`ExecError::CommandFailed`]; launch and I/O failures are wrapped in
    /// [`ExecError::Execution`].
    pub fn execute(&self) -> Result<Vec<String>> {
        let process = self.process();
        run(&process).map_err(|e| self.wrap(e))
    }

    /// Run the command on a dedicated worker, waiting at most `timeout`.
    ///
    /// A zero timeout means no deadline and runs inline, exactly like
    /// [`execute`](Self::execute). Otherwise the process is destroyed before
    /// this returns, whichever way the run ended.
    pub fn execute_with_timeout(&self, timeout: Duration) -> Result<Vec<String>> {
        if timeout.is_zero() {
            return self.execute();
        }

        let process = Arc::new(self.process());
        let (tx, rx) = mpsc::sync_channel(1);
        let worker = Arc::clone(&process);
        spawn_worker(process.id(), move || {
            let _ = tx.send(run(&worker));
        })
        .map_err(|e| self.wrap(ExecError::Io(e)))?;

        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|e| self.wrap(e)),
            Err(RecvTimeoutError::Timeout) => {
                debug!(id = %process.id(), "command timed out after {:?}", timeout);
                Err(ExecError::Timeout {
                    command: self.to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.wrap(ExecError::Io(
                std::io::Error::new(std::io::ErrorKind::Interrupted, "worker exited without a result"),
            ))),
        };

        process.abandon();
        outcome
    }

    /// Run the command, giving up at an absolute deadline.
    ///
    /// A deadline already in the past times out at once.
    pub fn execute_until(&self, deadline: Instant) -> Result<Vec<String>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        // Zero would mean "no deadline".
        self.execute_with_timeout(remaining.max(Duration::from_nanos(1)))
    }

    /// Start the command on its own worker thread and return immediately.
    ///
    /// The worker runs exactly this one invocation and then exits.
    pub fn execute_later(&self) -> Result<PendingOutput> {
        let process = Arc::new(self.process());
        let worker = Arc::clone(&process);
        let command = self.clone();
        let handle = spawn_worker(process.id(), move || {
            run(&worker).map_err(|e| command.wrap(e))
        })
        .map_err(|e| self.wrap(ExecError::Io(e)))?;

        Ok(PendingOutput { process, handle })
    }

    /// Run the command without blocking the async runtime.
    ///
    /// The invocation gets its own blocking task. The process is destroyed
    /// once this returns, and also when the future is dropped unfinished.
    pub async fn execute_async(&self, timeout: Option<Duration>) -> Result<Vec<String>> {
        let process = Arc::new(self.process());
        let _guard = DestroyOnDrop(Arc::clone(&process));
        let worker = Arc::clone(&process);
        let task = tokio::task::spawn_blocking(move || run(&worker));

        match timeout.filter(|t| !t.is_zero()) {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => self.joined(joined),
                Err(_) => {
                    debug!(id = %process.id(), "command timed out after {:?}", limit);
                    Err(ExecError::Timeout {
                        command: self.to_string(),
                        timeout: limit,
                    })
                }
            },
            None => self.joined(task.await),
        }
    }

    fn joined(
        &self,
        joined: std::result::Result<Result<Vec<String>>, tokio::task::JoinError>,
    ) -> Result<Vec<String>> {
        match joined {
            Ok(result) => result.map_err(|e| self.wrap(e)),
            Err(e) => Err(self.wrap(ExecError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                format!("worker task failed: {e}"),
            )))),
        }
    }

    /// Wrap infrastructure failures; command failures pass through.
    fn wrap(&self, err: ExecError) -> ExecError {
        match err {
            ExecError::CommandFailed(_)
            | ExecError::Timeout { .. }
            | ExecError::Execution { .. } => err,
            other => ExecError::Execution {
                command: self.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result of [`Command::execute_later`] that has not been collected yet.
pub struct PendingOutput {
    process: Arc<Process>,
    handle: JoinHandle<Result<Vec<String>>>,
}

impl PendingOutput {
    /// Identifier of the running invocation.
    pub fn id(&self) -> InvocationId {
        self.process.id()
    }

    /// The running invocation.
    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Whether the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Forcibly terminate the process. [`wait`](Self::wait) then reports the
    /// killed process as a command failure.
    ///
    /// If the worker has not started the process yet, it never will.
    pub fn destroy(&self) -> Destroyed {
        self.process.abandon()
    }

    /// Block until the worker finishes and return its result.
    pub fn wait(self) -> Result<Vec<String>> {
        let command = self.process.command().to_string();
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                warn!(id = %self.process.id(), "command worker panicked");
                self.process.destroy();
                Err(ExecError::Execution {
                    command,
                    source: Box::new(ExecError::Io(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "worker panicked",
                    ))),
                })
            }
        }
    }
}

impl fmt::Debug for PendingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOutput")
            .field("process", &self.process)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Destroys the process when the owning call ends, however it ends.
struct DestroyOnDrop(Arc<Process>);

impl Drop for DestroyOnDrop {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// Build and run a command from its arguments.
pub fn execute_simple<I, A>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = A>,
    A: fmt::Display,
{
    Command::builder().args(args).build()?.execute()
}

fn run(process: &Process) -> Result<Vec<String>> {
    process.start()?;
    process.gather_output()
}

fn spawn_worker<F, T>(id: InvocationId, f: F) -> std::io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new().name(id.to_string()).spawn(f)
}
