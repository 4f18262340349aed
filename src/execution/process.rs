//! A running invocation of a [`Command`].

use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::command::Command;
use super::id::InvocationId;
use super::pipe::{MergedOutput, MergedPipe};
use super::result::ExecutionResult;
use super::sink;
use super::state::ProcessState;
use crate::error::ExecError;
use crate::Result;

/// Interval between exit-status polls once output has reached EOF.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Outcome of [`Process::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destroyed {
    /// The process was never started; nothing to do.
    NotStarted,
    /// The process had already exited or been destroyed.
    AlreadyTerminated,
    /// The process was killed and reaped.
    Killed {
        /// Exit status observed after the kill.
        exit_code: i32,
    },
    /// Kill or reap failed. Details were logged.
    Failed,
}

/// Handle to one OS process spawned from a [`Command`].
///
/// All methods take `&self` so that one thread can gather output while
/// another destroys the process; share it with `Arc`.
pub struct Process {
    id: InvocationId,
    command: Command,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: ProcessState,
    child: Option<Child>,
    reader: Option<MergedOutput>,
    lines: Vec<String>,
    exit_code: Option<i32>,
    started_at: Option<Instant>,
}

impl Process {
    /// Create a handle for `command` without starting it.
    pub fn new(command: Command) -> Self {
        Self {
            id: InvocationId::new(),
            command,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Identifier used in logs.
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// The command this process runs.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    /// Whether [`start`](Self::start) has been attempted.
    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// OS process id, while the child handle is held.
    pub fn pid(&self) -> Option<u32> {
        self.lock().ok()?.child.as_ref().map(Child::id)
    }

    /// Lines captured so far.
    pub fn captured(&self) -> Vec<String> {
        self.lock().map(|inner| inner.lines.clone()).unwrap_or_default()
    }

    /// Spawn the OS process.
    ///
    /// Stderr is merged into stdout and stdin is closed. Fails without
    /// touching the OS if the process was already started. A launch failure
    /// leaves the handle terminated; it is never retried.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.state.can_transition_to(ProcessState::Started) {
            return Err(ExecError::InvalidStateTransition {
                from: inner.state,
                to: ProcessState::Started,
            });
        }

        debug!(id = %self.id, "executing {}", self.command);

        let spawned = MergedPipe::new().and_then(|pipe| {
            let MergedPipe {
                stdout,
                stderr,
                reader,
            } = pipe;
            let mut std_cmd = std::process::Command::new(self.command.program());
            std_cmd
                .args(&self.command.args()[1..])
                .envs(self.command.env())
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr);
            if let Some(dir) = self.command.working_dir() {
                std_cmd.current_dir(dir);
            }
            let mut child = std_cmd.spawn()?;
            // Drop the parent's write ends so EOF follows the child's exit.
            drop(std_cmd);
            let reader = MergedOutput::attach(reader, &mut child);
            Ok((child, reader))
        });

        match spawned {
            Ok((child, Ok(reader))) => {
                inner.state.transition_to(ProcessState::Started)?;
                inner.started_at = Some(Instant::now());
                inner.reader = Some(reader);
                debug!(id = %self.id, pid = child.id(), "process started");
                inner.child = Some(child);
                Ok(())
            }
            Ok((mut child, Err(e))) => {
                let _ = child.kill();
                let _ = child.wait();
                inner.state.transition_to(ProcessState::Terminated)?;
                Err(ExecError::Io(e))
            }
            Err(source) => {
                inner.state.transition_to(ProcessState::Terminated)?;
                Err(ExecError::Launch {
                    program: self.command.program().to_string(),
                    source,
                })
            }
        }
    }

    /// Read all output, wait for exit, and return the unclassified result.
    ///
    /// Each line is passed to the tee sink and the native-output mirror as
    /// soon as it is read. The exit status is collected only after the
    /// stream reaches end of input.
    pub fn gather_result(&self) -> Result<ExecutionResult> {
        let mut reader = {
            let mut inner = self.lock()?;
            match inner.state {
                ProcessState::NotStarted => return Err(ExecError::NotStarted),
                _ => inner.reader.take().ok_or(ExecError::AlreadyGathered(self.id))?,
            }
        };

        if let Err(e) = self.drain(&mut reader) {
            warn!(id = %self.id, "reading output failed: {}", e);
            self.destroy();
            return Err(e);
        }
        drop(reader);

        let exit_code = self.wait_for_exit()?;
        let inner = self.lock()?;
        let duration = inner.started_at.map(|t| t.elapsed()).unwrap_or_default();

        Ok(
            ExecutionResult::new(inner.lines.clone(), exit_code, duration)
                .with_permit_non_zero_exit(self.command.permits_non_zero_exit()),
        )
    }

    fn drain(&self, reader: &mut MergedOutput) -> Result<()> {
        while let Some(line) = reader.next_line()? {
            if let Some(tee) = self.command.tee() {
                if let Err(e) = tee.write_line(&line) {
                    warn!(id = %self.id, "failed to tee output: {}", e);
                }
            }
            if self.command.native_output() {
                sink::mirror_native(&line);
            }
            self.lock()?.lines.push(line);
        }
        Ok(())
    }

    /// Read all output and classify the exit status.
    ///
    /// A non-zero status without permission becomes
    /// [`ExecError::CommandFailed`], which still carries every captured line.
    pub fn gather_output(&self) -> Result<Vec<String>> {
        self.gather_result()?.into_output(self.command.args())
    }

    /// Forcibly terminate the process.
    ///
    /// Never fails: problems are logged and reported through the returned
    /// [`Destroyed`] value. Calling it on a process that was never started or
    /// has already terminated does nothing.
    pub fn destroy(&self) -> Destroyed {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        match inner.state {
            ProcessState::NotStarted => Destroyed::NotStarted,
            ProcessState::Terminated => {
                debug!(id = %self.id, "destroy: process already terminated");
                Destroyed::AlreadyTerminated
            }
            ProcessState::Started => {
                let Some(child) = inner.child.as_mut() else {
                    warn!(id = %self.id, "destroy: started process has no child handle");
                    return Destroyed::Failed;
                };

                if let Err(e) = child.kill() {
                    warn!(id = %self.id, "failed to kill process: {}", e);
                }
                match child.wait() {
                    Ok(status) => {
                        let exit_code = exit_code(status);
                        inner.exit_code = Some(exit_code);
                        inner.state = ProcessState::Terminated;
                        debug!(
                            id = %self.id,
                            "destroyed {} with exit status {}", self.command, exit_code
                        );
                        Destroyed::Killed { exit_code }
                    }
                    Err(e) => {
                        warn!(id = %self.id, "failed to reap destroyed process: {}", e);
                        inner.state = ProcessState::Terminated;
                        Destroyed::Failed
                    }
                }
            }
        }
    }

    /// Destroy the process and make sure it can never be started later.
    ///
    /// Used when the caller stops waiting before a worker got around to
    /// starting the process.
    pub(crate) fn abandon(&self) -> Destroyed {
        {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            if inner.state == ProcessState::NotStarted {
                inner.state = ProcessState::Terminated;
                debug!(id = %self.id, "abandoned before start");
                return Destroyed::NotStarted;
            }
        }
        self.destroy()
    }

    fn wait_for_exit(&self) -> Result<i32> {
        loop {
            {
                let mut inner = self.lock()?;
                if inner.state.is_terminal() {
                    return inner.exit_code.ok_or_else(|| {
                        ExecError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "process was destroyed before its exit status was known",
                        ))
                    });
                }
                let child = inner.child.as_mut().ok_or(ExecError::NotStarted)?;
                if let Some(status) = child.try_wait()? {
                    let code = exit_code(status);
                    inner.exit_code = Some(code);
                    inner.state.transition_to(ProcessState::Terminated)?;
                    debug!(id = %self.id, "process exited with status {}", code);
                    return Ok(code);
                }
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| ExecError::LockPoisoned)
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("state", &self.state())
            .finish()
    }
}

/// Map an exit status to an integer, using `128 + signal` for signal deaths.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
