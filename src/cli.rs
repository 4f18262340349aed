//! Command-line interface for cmdexec.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Program and arguments to run.
    pub command: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Environment overrides, in command-line order.
    pub env: Vec<(String, String)>,
    /// Deadline in seconds (overrides config).
    pub timeout_secs: Option<u64>,
    /// Maximum rendered command length (overrides config).
    pub max_length: Option<usize>,
    /// Treat non-zero exit statuses as success.
    pub permit_non_zero: bool,
    /// Stream lines to stdout as they are read.
    pub tee: bool,
    /// Mirror lines to the native-output log channel.
    pub native_output: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log filter (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// Everything from the first positional argument on is the command to run,
/// so options meant for the child need no `--` separator.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('C') | Long("cwd") => {
                result.cwd = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("env") => {
                let value: String = parser.value()?.parse()?;
                let (key, val) = value
                    .split_once('=')
                    .filter(|(key, _)| !key.is_empty())
                    .ok_or_else(|| ArgsError::InvalidValue("env", value.clone()))?;
                result.env.push((key.to_string(), val.to_string()));
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('m') | Long("max-length") => {
                let value: String = parser.value()?.parse()?;
                result.max_length = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("max-length", value))?,
                );
            }
            Long("permit-non-zero") => {
                result.permit_non_zero = true;
            }
            Long("tee") => {
                result.tee = true;
            }
            Long("native-output") => {
                result.native_output = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(program) => {
                result.command.push(os_to_string(program)?);
                for rest in parser.raw_args()? {
                    result.command.push(os_to_string(rest)?);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if result.command.is_empty() && !result.help && !result.version {
        return Err(ArgsError::MissingCommand);
    }

    Ok(result)
}

fn os_to_string(value: OsString) -> Result<String, ArgsError> {
    value
        .into_string()
        .map_err(|raw| ArgsError::NonUnicode(raw.to_string_lossy().into_owned()))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cmdexec {version}
Run a command, capturing its merged stdout/stderr line by line

USAGE:
    cmdexec [OPTIONS] [--] PROGRAM [ARGS...]

OPTIONS:
    -C, --cwd <DIR>         Working directory for the command
    -e, --env <KEY=VALUE>   Set an environment variable (repeatable)
    -t, --timeout <SECS>    Kill the command after SECS seconds [default: 0 = never]
    -m, --max-length <N>    Refuse commands whose rendering exceeds N characters
        --permit-non-zero   Treat a non-zero exit status as success
        --tee               Print lines as they are read instead of at exit
        --native-output     Mirror lines to the native-output log channel
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log filter (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    CMDEXEC_TIMEOUT          Default deadline in seconds
    CMDEXEC_MAX_LENGTH       Default maximum command length
    CMDEXEC_PERMIT_NON_ZERO  Default for --permit-non-zero (true/false)
    CMDEXEC_NATIVE_OUTPUT    Default for --native-output (true/false)
    CMDEXEC_LOG_LEVEL        Log filter (overrides config)
    RUST_LOG                 Alternative log filter setting

EXIT STATUS:
    The command's own status when it fails, 124 on timeout,
    2 on usage or configuration errors, 1 on other failures.

EXAMPLES:
    # Run with a deadline
    cmdexec -t 60 make -j8

    # Stream output live, in another directory
    cmdexec --tee -C /src/project git log --oneline
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cmdexec {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// No program to run was given.
    MissingCommand,
    /// Command argument is not valid Unicode.
    NonUnicode(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::MissingCommand => write!(f, "no command given"),
            Self::NonUnicode(arg) => write!(f, "argument is not valid unicode: '{}'", arg),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
