//! cmdexec binary entry point.

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use cmdexec::cli::{self, Args};
use cmdexec::config::Config;
use cmdexec::{logging, Command, ExecError};
use tracing::{debug, error};

/// Exit status reported when the deadline elapses, as in coreutils `timeout`.
const EXIT_TIMEOUT: u8 = 124;
const EXIT_USAGE: u8 = 2;
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let code = runtime.block_on(run());
    // A reader blocked on a pipe held open by an orphaned grandchild must not
    // delay exit past the deadline.
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'cmdexec --help' for more information.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    logging::init_with_filter(config.log_filter()).ok();
    debug!("cmdexec v{}", env!("CARGO_PKG_VERSION"));

    let command = match build_command(&args, &config) {
        Ok(command) => command,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let timeout = config.execution.timeout();
    match command
        .execute_async(Some(timeout).filter(|t| !t.is_zero()))
        .await
    {
        Ok(lines) => {
            if !args.tee {
                for line in lines {
                    println!("{line}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(ExecError::CommandFailed(failure)) => {
            if !args.tee {
                for line in &failure.output {
                    println!("{line}");
                }
            }
            error!(
                "command failed with exit status {}: {}",
                failure.exit_code,
                failure.args.join(" ")
            );
            ExitCode::from(u8::try_from(failure.exit_code).unwrap_or(EXIT_FAILURE))
        }
        Err(e @ ExecError::Timeout { .. }) => {
            error!("{e}");
            ExitCode::from(EXIT_TIMEOUT)
        }
        Err(e) => {
            error!("{e}");
            if let Some(source) = std::error::Error::source(&e) {
                error!("caused by: {source}");
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn build_command(args: &Args, config: &Config) -> cmdexec::Result<Command> {
    let mut builder = Command::builder()
        .args(&args.command)
        .envs(args.env.iter().cloned())
        .apply_config(&config.execution);

    if let Some(ref dir) = args.cwd {
        builder = builder.working_dir(dir.clone());
    }
    if args.tee {
        builder = builder.tee(Arc::new(Mutex::new(std::io::stdout())));
    }

    builder.build()
}
