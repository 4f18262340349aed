//! Destinations for captured output lines.

use std::io::{self, Write};
use std::sync::Mutex;

/// Tracing target used for the native-output mirror.
pub const NATIVE_OUTPUT_TARGET: &str = "cmdexec::native";

/// A destination that receives a live copy of every captured line.
///
/// The executor writes lines one at a time, in the order they were read, from
/// whichever thread is gathering output. Sharing a sink between concurrent
/// invocations is allowed by the trait bounds, but interleaving is then up to
/// the caller.
pub trait LineSink: Send + Sync {
    /// Receive one line, without its line terminator.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

impl<W: Write + Send> LineSink for Mutex<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "tee sink lock poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

impl LineSink for std::sync::mpsc::Sender<String> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.send(line.to_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "tee receiver dropped"))
    }
}

impl LineSink for tokio::sync::mpsc::UnboundedSender<String> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.send(line.to_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "tee receiver dropped"))
    }
}

/// Forward a captured line to the native-output channel.
pub(crate) fn mirror_native(line: &str) {
    tracing::info!(target: NATIVE_OUTPUT_TARGET, "{}", line);
}
