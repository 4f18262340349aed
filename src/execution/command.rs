//! Command description and building.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::sink::LineSink;
use crate::config::ExecutionSection;
use crate::error::ExecError;
use crate::Result;

/// An immutable description of a program to run.
///
/// Built with [`CommandBuilder`]. A `Command` can be started any number of
/// times; each start spawns a fresh OS process.
#[derive(Clone)]
pub struct Command {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    permit_non_zero_exit: bool,
    tee: Option<Arc<dyn LineSink>>,
    native_output: bool,
}

impl Command {
    /// Start building a command.
    pub fn builder() -> CommandBuilder {
        CommandBuilder::new()
    }

    /// Program followed by its arguments. Never empty.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The program to run.
    pub fn program(&self) -> &str {
        &self.args[0]
    }

    /// Environment overrides merged into the inherited environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Absolute working directory, if one was set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Whether a non-zero exit status counts as success.
    pub fn permits_non_zero_exit(&self) -> bool {
        self.permit_non_zero_exit
    }

    /// The tee sink, if any.
    pub fn tee(&self) -> Option<&Arc<dyn LineSink>> {
        self.tee.as_ref()
    }

    /// Whether lines are mirrored to the native-output channel.
    pub fn native_output(&self) -> bool {
        self.native_output
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.args.join(" "))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("args", &self.args)
            .field("env", &self.env)
            .field("working_dir", &self.working_dir)
            .field("permit_non_zero_exit", &self.permit_non_zero_exit)
            .field("tee", &self.tee.is_some())
            .field("native_output", &self.native_output)
            .finish()
    }
}

/// Builder for [`Command`] with a fluent API.
#[derive(Default)]
pub struct CommandBuilder {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    permit_non_zero_exit: bool,
    tee: Option<Arc<dyn LineSink>>,
    native_output: bool,
    max_length: Option<usize>,
}

impl CommandBuilder {
    /// Create a new command builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one argument in its display form.
    ///
    /// The first argument is the program.
    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Append several arguments, preserving order.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: fmt::Display,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    /// Append a filesystem path as an argument.
    pub fn path_arg(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    /// Set an environment variable. The last value for a name wins.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set the local working directory.
    ///
    /// Commands that wrap a remote shim still need a local directory here,
    /// since the wrapper itself runs locally.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set whether a non-zero exit status counts as success.
    pub fn permit_non_zero_exit(mut self, permit: bool) -> Self {
        self.permit_non_zero_exit = permit;
        self
    }

    /// Copy every captured line to `sink` as it is read.
    pub fn tee(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.tee = Some(sink);
        self
    }

    /// Set whether captured lines are mirrored to the native-output channel.
    pub fn native_output(mut self, enabled: bool) -> Self {
        self.native_output = enabled;
        self
    }

    /// Reject the command at build time if its rendering is longer than `max`.
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Seed defaults from configuration.
    pub fn apply_config(mut self, config: &ExecutionSection) -> Self {
        self.permit_non_zero_exit |= config.permit_non_zero_exit;
        self.native_output |= config.native_output;
        if let Some(max) = config.max_length {
            self.max_length = Some(max);
        }
        self
    }

    /// Build the command.
    ///
    /// Fails if no program was given or the rendered command exceeds the
    /// maximum length. Nothing is spawned.
    pub fn build(self) -> Result<Command> {
        if self.args.is_empty() {
            return Err(ExecError::InvalidCommand("no program given".into()));
        }
        if self.args[0].is_empty() {
            return Err(ExecError::InvalidCommand("program name is empty".into()));
        }

        let working_dir = match self.working_dir {
            Some(dir) if dir.is_relative() => Some(std::env::current_dir()?.join(dir)),
            other => other,
        };

        let command = Command {
            args: self.args,
            env: self.env,
            working_dir,
            permit_non_zero_exit: self.permit_non_zero_exit,
            tee: self.tee,
            native_output: self.native_output,
        };

        if let Some(max) = self.max_length {
            let rendered = command.to_string();
            let length = rendered.chars().count();
            if length > max {
                return Err(ExecError::TooLong {
                    command: rendered,
                    length,
                    max,
                });
            }
        }

        Ok(command)
    }

    /// Build the command and run it synchronously.
    pub fn execute(self) -> Result<Vec<String>> {
        self.build()?.execute()
    }
}
