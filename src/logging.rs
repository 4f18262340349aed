//! Logging initialization and configuration.
//!
//! Captured lines mirrored to the native-output channel are logged on the
//! [`NATIVE_OUTPUT_TARGET`](crate::execution::NATIVE_OUTPUT_TARGET) target,
//! which the default filter includes.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit filter is given.
pub const DEFAULT_FILTER: &str = "cmdexec=info";

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `cmdexec=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Initialize logging with an explicit filter, such as one from [`Config`].
///
/// A bare level like `debug` applies to this crate only. Logs go to stderr so
/// they never mix with captured output printed on stdout.
///
/// [`Config`]: crate::config::Config
pub fn init_with_filter(filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(parse_filter(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
}

fn parse_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directive(filter)).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Scope a bare level to this crate; pass full directives through.
fn filter_directive(filter: &str) -> String {
    match filter.trim() {
        "" => DEFAULT_FILTER.to_string(),
        level @ ("error" | "warn" | "info" | "debug" | "trace" | "off") => {
            format!("cmdexec={level}")
        }
        other => other.to_string(),
    }
}
