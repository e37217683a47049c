//! Section collection strategies.
//!
//! Every way of obtaining a diagnostic section is a [`SectionSource`]:
//! something that can produce bytes into a [`CaptureBuffer`] under a
//! deadline. The pipeline does not care whether the bytes come from a
//! file, a spawned command, or a blocking call parked on a worker thread.

use crate::buffer::CaptureBuffer;
use crate::error::{CaptureError, Result};
use crate::worker::WorkerPool;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Grace period between SIGTERM and SIGKILL.
const SIGTERM_GRACE: Duration = Duration::from_millis(500);

/// The collection capability: produce one section's bytes into `buf`
/// before `deadline`.
///
/// Deadline expiry and truncation are recorded on the buffer, not
/// returned as errors.
pub trait SectionSource: Send {
    /// Short name for logs.
    fn describe(&self) -> String;

    fn produce(&mut self, buf: &mut CaptureBuffer, deadline: Instant) -> Result<()>;
}

/// Reads a file (including proc/sys pseudo-files) into the buffer.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SectionSource for FileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn produce(&mut self, buf: &mut CaptureBuffer, deadline: Instant) -> Result<()> {
        let mut file = File::open(&self.path)?;
        buf.fill(&mut file, deadline)
    }
}

/// Spawns a command and captures its stdout.
///
/// The child runs with a scrubbed environment and is escalated
/// SIGTERM → SIGKILL if it outlives the deadline.
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl SectionSource for CommandSource {
    fn describe(&self) -> String {
        format!("cmd:{}", self.command)
    }

    fn produce(&mut self, buf: &mut CaptureBuffer, deadline: Instant) -> Result<()> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_clear();
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
        command.env("LC_ALL", "C").env("LANG", "C");

        let mut child = command.spawn()?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::Io(io::Error::other("child stdout was not captured"))
        })?;

        let fill_result = buf.fill(&mut stdout, deadline);
        drop(stdout);

        if buf.timed_out() {
            kill_with_grace(&mut child);
        } else {
            match child.wait() {
                Ok(status) if !status.success() => {
                    // Diagnostic commands often exit non-zero with usable
                    // output; record and move on.
                    warn!(command = %self.command, status = ?status.code(), "command exited non-zero");
                }
                Ok(_) => {}
                Err(e) => warn!(command = %self.command, error = %e, "failed to reap child"),
            }
        }
        fill_result
    }
}

/// Runs a blocking producer on a worker pool, captured through a pipe.
///
/// For system calls that cannot be polled. The producer writes into the
/// pipe from a worker thread; this side drains the pipe under the
/// deadline. An overrunning producer is abandoned to its worker — closing
/// our read end makes its next write fail and unblock the thread.
pub struct WorkerSource {
    name: String,
    pool: Arc<WorkerPool>,
    producer: Option<Box<dyn FnOnce(&mut dyn Write) -> io::Result<()> + Send>>,
}

impl WorkerSource {
    pub fn new<F>(name: impl Into<String>, pool: Arc<WorkerPool>, producer: F) -> Self
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            pool,
            producer: Some(Box::new(producer)),
        }
    }
}

impl SectionSource for WorkerSource {
    fn describe(&self) -> String {
        format!("worker:{}", self.name)
    }

    fn produce(&mut self, buf: &mut CaptureBuffer, deadline: Instant) -> Result<()> {
        let producer = self.producer.take().ok_or(CaptureError::SourceConsumed)?;
        let (mut reader, writer) = os_pipe()?;

        let handle = self.pool.submit(move || {
            let mut writer = writer;
            let result = producer(&mut writer).and_then(|_| writer.flush());
            // writer drops here, delivering EOF to the reader
            result
        })?;

        buf.fill(&mut reader, deadline)?;
        drop(reader);

        if buf.timed_out() {
            trace!(source = %self.name, "producer abandoned at deadline");
            return Ok(());
        }
        match handle.wait_until(deadline) {
            Some(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => Err(CaptureError::Io(e)),
            _ => Ok(()),
        }
    }
}

/// Unix pipe as (read, write) Files, close-on-exec.
fn os_pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(CaptureError::Io(io::Error::last_os_error()));
    }
    unsafe { Ok((File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1]))) }
}

/// SIGTERM, grace period, then SIGKILL.
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");
    thread::sleep(SIGTERM_GRACE);
    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "child exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "child ignored SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
            let _ = child.wait();
        }
        Err(e) => warn!(pid, error = %e, "failed to check child status"),
    }
}
