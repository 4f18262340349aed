//! Merged stdout/stderr capture.
//!
//! On Unix both standard streams of the child are pointed at the write end of
//! a single pipe, so lines arrive in exactly the order the child produced
//! them. Elsewhere stdout and stderr are piped separately and pumped into one
//! channel by helper threads.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Stdio};

/// Reader half of a merged output stream.
pub(crate) enum MergedOutput {
    /// Both streams share one pipe.
    Pipe(BufReader<std::fs::File>),
    /// Streams pumped by helper threads.
    Pumped(std::sync::mpsc::Receiver<io::Result<Vec<u8>>>),
}

/// Stdio handles to hand to the child, plus the reader kept by the parent.
pub(crate) struct MergedPipe {
    pub(crate) stdout: Stdio,
    pub(crate) stderr: Stdio,
    pub(crate) reader: Option<MergedOutput>,
}

impl MergedPipe {
    /// Create the pipe. Descriptors are close-on-exec in the parent.
    #[cfg(unix)]
    pub(crate) fn new() -> io::Result<Self> {
        use std::os::fd::OwnedFd;

        let (read, write) = unix::pipe()?;
        let write_err: OwnedFd = write.try_clone()?;
        Ok(Self {
            stdout: Stdio::from(write),
            stderr: Stdio::from(write_err),
            reader: Some(MergedOutput::Pipe(BufReader::new(std::fs::File::from(read)))),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            stdout: Stdio::piped(),
            stderr: Stdio::piped(),
            reader: None,
        })
    }
}

impl MergedOutput {
    /// Obtain the reader for a freshly spawned child.
    ///
    /// `pipe_reader` is the reader half created by [`MergedPipe::new`]; when
    /// it is absent the child's own stdout and stderr pipes are pumped.
    pub(crate) fn attach(pipe_reader: Option<Self>, child: &mut Child) -> io::Result<Self> {
        if let Some(reader) = pipe_reader {
            return Ok(reader);
        }

        let (tx, rx) = std::sync::mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone())?;
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx)?;
        }
        Ok(Self::Pumped(rx))
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` at end of input.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<String>> {
        let bytes = match self {
            Self::Pipe(reader) => {
                let mut buf = Vec::new();
                if reader.read_until(b'\n', &mut buf)? == 0 {
                    return Ok(None);
                }
                buf
            }
            Self::Pumped(rx) => match rx.recv() {
                Ok(line) => line?,
                Err(_) => return Ok(None),
            },
        };
        Ok(Some(decode_line(&bytes)))
    }
}

/// Decode a raw line as UTF-8 and strip `\n` or `\r\n`.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn pump<R: Read + Send + 'static>(
    stream: R,
    tx: std::sync::mpsc::Sender<io::Result<Vec<u8>>>,
) -> io::Result<()> {
    std::thread::Builder::new()
        .name("cmdexec-pump".into())
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            loop {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(buf)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::fd::{FromRawFd, OwnedFd};

    /// Create a pipe whose descriptors are both close-on-exec.
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    pub(super) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [-1; 2];
        // SAFETY: `fds` has room for the two descriptors pipe2 writes.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe2 succeeded, both descriptors are open and unowned.
        Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    pub(super) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        use std::os::fd::AsRawFd;

        let mut fds: [libc::c_int; 2] = [-1; 2];
        // SAFETY: `fds` has room for the two descriptors pipe writes.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe succeeded, both descriptors are open and unowned.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [&read, &write] {
            // SAFETY: the descriptor is valid for the lifetime of the OwnedFd.
            let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
            if flags < 0
                || unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC) }
                    < 0
            {
                return Err(io::Error::last_os_error());
            }
        }
        Ok((read, write))
    }
}
