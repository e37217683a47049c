//! Growable capture buffer with deadline-aware fill.

use crate::error::{CaptureError, Result};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default hard cap on captured bytes (4 MiB).
pub const DEFAULT_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Read granularity for fd draining.
const CHUNK_SIZE: usize = 8192;

/// Fixed staging capacity for `pump`.
const STAGE_SIZE: usize = 32 * 1024;

/// One section's captured bytes plus the soft outcome of collecting them.
///
/// Owned exclusively by the capturing pipeline until handed out by shared
/// reference for redaction passes; reset and pooled between uses.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    limit: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    timed_out: bool,
    truncated: bool,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_SIZE_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            started_at: None,
            finished_at: None,
            timed_out: false,
            truncated: false,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The capture hit its deadline before the source reached EOF.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// The capture hit the size cap before the source reached EOF.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Wall time the capture took, once finished.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some(f.duration_since(s)),
            _ => None,
        }
    }

    /// Clear contents and flags for reuse. Capacity is kept.
    pub fn reset(&mut self) {
        self.data.clear();
        self.started_at = None;
        self.finished_at = None;
        self.timed_out = false;
        self.truncated = false;
    }

    /// Drain a readable fd into the buffer until EOF, the size cap, or the
    /// deadline — whichever comes first.
    ///
    /// Cap and deadline are soft outcomes recorded on the buffer; only a
    /// hard fd error fails. Readiness is polled with a recomputed remaining
    /// budget each round. Pseudo-file sources (sysfs-style) can raise a
    /// spurious error-ready event; the read is attempted regardless.
    pub fn fill<R: Read + AsRawFd>(&mut self, source: &mut R, deadline: Instant) -> Result<()> {
        self.started_at = Some(Instant::now());
        let fd = source.as_raw_fd();
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            if self.data.len() >= self.limit {
                self.truncated = true;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                self.timed_out = true;
                break;
            }
            match poll_readable(fd, deadline - now)? {
                PollOutcome::TimedOut => {
                    self.timed_out = true;
                    break;
                }
                PollOutcome::Ready => {}
            }
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.push_chunk(&chunk[..n])?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CaptureError::Io(e)),
            }
        }

        self.finished_at = Some(Instant::now());
        trace!(
            bytes = self.data.len(),
            timed_out = self.timed_out,
            truncated = self.truncated,
            "fill complete"
        );
        Ok(())
    }

    /// Feed `source` through a transform child while draining the child's
    /// output into the buffer.
    ///
    /// `sink_write` is the child's input, taken by value so it can be
    /// dropped (half-closed) the moment the source is drained — without
    /// that the child never sees EOF. A fixed-size circular staging area
    /// sits between source and child so a slow transform never forces more
    /// than `STAGE_SIZE` bytes of upstream readahead.
    pub fn pump<R, W, T>(
        &mut self,
        source: &mut R,
        sink_write: W,
        sink_read: &mut T,
        deadline: Instant,
    ) -> Result<()>
    where
        R: Read + AsRawFd,
        W: Write + AsRawFd,
        T: Read + AsRawFd,
    {
        self.started_at = Some(Instant::now());
        let mut stage = Ring::new();
        let mut sink_write = Some(sink_write);
        let mut source_eof = false;
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            if self.data.len() >= self.limit {
                self.truncated = true;
                break;
            }
            if source_eof && stage.is_empty() {
                // Upstream is drained: half-close the transform's input so
                // it can finish and close its output.
                sink_write = None;
            }

            let now = Instant::now();
            if now >= deadline {
                self.timed_out = true;
                break;
            }

            let mut fds: [libc::pollfd; 3] = [libc::pollfd {
                fd: -1,
                events: 0,
                revents: 0,
            }; 3];
            let mut nfds = 0usize;
            let mut source_slot = None;
            let mut write_slot = None;

            if !source_eof && !stage.is_full() {
                fds[nfds] = libc::pollfd {
                    fd: source.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                };
                source_slot = Some(nfds);
                nfds += 1;
            }
            if let Some(w) = sink_write.as_ref() {
                if !stage.is_empty() {
                    fds[nfds] = libc::pollfd {
                        fd: w.as_raw_fd(),
                        events: libc::POLLOUT,
                        revents: 0,
                    };
                    write_slot = Some(nfds);
                    nfds += 1;
                }
            }
            let read_slot = nfds;
            fds[nfds] = libc::pollfd {
                fd: sink_read.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            nfds += 1;

            let timeout_ms = poll_timeout_ms(deadline - now);
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), nfds as libc::nfds_t, timeout_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(CaptureError::Io(err));
            }
            if rc == 0 {
                self.timed_out = true;
                break;
            }

            // Spurious error-ready events from pseudo-file sources are not
            // fatal; any wakeup on the slot leads to a read attempt.
            if let Some(slot) = source_slot {
                if fds[slot].revents != 0 {
                    match source.read(stage.free_span(&mut chunk)) {
                        Ok(0) => source_eof = true,
                        Ok(n) => stage.commit(&chunk[..n]),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(CaptureError::Io(e)),
                    }
                }
            }

            if let Some(slot) = write_slot {
                if fds[slot].revents != 0 {
                    if let Some(w) = sink_write.as_mut() {
                        match w.write(stage.used_span()) {
                            Ok(n) => stage.consume(n),
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                                // Transform closed its input early; stop
                                // feeding it and let its output drain.
                                sink_write = None;
                                stage.clear();
                            }
                            Err(e) => return Err(CaptureError::Io(e)),
                        }
                    }
                }
            }

            if fds[read_slot].revents != 0 {
                match sink_read.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => self.push_chunk(&chunk[..n])?,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(CaptureError::Io(e)),
                }
            }
        }

        self.finished_at = Some(Instant::now());
        debug!(
            bytes = self.data.len(),
            timed_out = self.timed_out,
            truncated = self.truncated,
            "pump complete"
        );
        Ok(())
    }

    fn push_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let space = self.limit.saturating_sub(self.data.len());
        let take = chunk.len().min(space);
        if take < chunk.len() {
            self.truncated = true;
        }
        self.data
            .try_reserve(take)
            .map_err(|_| CaptureError::NoMemory { requested: take })?;
        self.data.extend_from_slice(&chunk[..take]);
        Ok(())
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CaptureBuffer {
    /// Appends up to the size cap; bytes past the cap are swallowed and
    /// the buffer marked truncated, mirroring `fill` semantics.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push_chunk(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum PollOutcome {
    Ready,
    TimedOut,
}

fn poll_timeout_ms(remaining: Duration) -> libc::c_int {
    remaining.as_millis().min(i32::MAX as u128) as libc::c_int
}

/// Wait for `fd` to become readable within `remaining`.
fn poll_readable(fd: libc::c_int, remaining: Duration) -> Result<PollOutcome> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, poll_timeout_ms(remaining)) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            // Treat like a zero-length wakeup; the caller recomputes the
            // remaining budget.
            return Ok(PollOutcome::Ready);
        }
        return Err(CaptureError::Io(err));
    }
    if rc == 0 {
        return Ok(PollOutcome::TimedOut);
    }
    Ok(PollOutcome::Ready)
}

/// Fixed-capacity FIFO staging area for `pump`.
///
/// Kept deliberately simple: data is staged in a scratch chunk and appended
/// contiguously; `consume` shifts the unwritten tail down. The staging area
/// is small enough that the shift cost is noise next to the fd round trips.
struct Ring {
    buf: Vec<u8>,
}

impl Ring {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(STAGE_SIZE),
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn is_full(&self) -> bool {
        self.buf.len() >= STAGE_SIZE
    }

    /// Scratch slice sized to remaining capacity for the next source read.
    fn free_span<'c>(&self, chunk: &'c mut [u8; CHUNK_SIZE]) -> &'c mut [u8] {
        let free = STAGE_SIZE - self.buf.len();
        let take = free.min(CHUNK_SIZE);
        &mut chunk[..take]
    }

    fn commit(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn used_span(&self) -> &[u8] {
        &self.buf
    }

    fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;
    use std::os::unix::io::FromRawFd;
    use std::process::{Command, Stdio};
    use std::thread;

    /// Unix pipe as (reader, writer) Files.
    fn os_pipe() -> (File, File) {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe(2) failed");
        unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_fill_reaches_eof_cleanly() {
        let (mut reader, mut writer) = os_pipe();
        let feeder = thread::spawn(move || {
            writer.write_all(b"hello section").unwrap();
            // writer drops here, closing the pipe
        });

        let mut buf = CaptureBuffer::new();
        buf.fill(&mut reader, deadline_in(2000)).unwrap();
        feeder.join().unwrap();

        assert_eq!(buf.data(), b"hello section");
        assert!(!buf.timed_out());
        assert!(!buf.truncated());
        assert!(buf.duration().is_some());
    }

    #[test]
    fn test_fill_deadline_is_soft() {
        let (mut reader, mut writer) = os_pipe();
        writer.write_all(b"partial").unwrap();
        // Keep the writer open so EOF never arrives.

        let mut buf = CaptureBuffer::new();
        let result = buf.fill(&mut reader, deadline_in(80));
        assert!(result.is_ok());
        assert!(buf.timed_out());
        assert!(!buf.truncated());
        assert_eq!(buf.data(), b"partial");
        drop(writer);
    }

    #[test]
    fn test_fill_cap_is_soft() {
        let (mut reader, mut writer) = os_pipe();
        let feeder = thread::spawn(move || {
            writer.write_all(&[0xab; 1024]).unwrap();
        });

        let mut buf = CaptureBuffer::with_limit(100);
        buf.fill(&mut reader, deadline_in(2000)).unwrap();
        feeder.join().unwrap();

        assert!(buf.truncated());
        assert!(!buf.timed_out());
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_reset_clears_flags_and_data() {
        let (mut reader, mut writer) = os_pipe();
        writer.write_all(b"x").unwrap();
        let mut buf = CaptureBuffer::with_limit(1);
        buf.fill(&mut reader, deadline_in(500)).unwrap();
        assert!(buf.truncated());

        buf.reset();
        assert!(buf.is_empty());
        assert!(!buf.truncated());
        assert!(!buf.timed_out());
        assert!(buf.duration().is_none());
        drop(writer);
    }

    #[test]
    fn test_write_impl_respects_cap() {
        let mut buf = CaptureBuffer::with_limit(4);
        buf.write_all(b"abcdef").unwrap();
        assert_eq!(buf.data(), b"abcd");
        assert!(buf.truncated());
    }

    #[test]
    fn test_pump_through_cat() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn cat");
        let child_in = child.stdin.take().unwrap();
        let mut child_out = child.stdout.take().unwrap();

        let (mut source_r, mut source_w) = os_pipe();
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let feeder = {
            let payload = payload.clone();
            thread::spawn(move || {
                source_w.write_all(&payload).unwrap();
            })
        };

        let mut buf = CaptureBuffer::new();
        buf.pump(&mut source_r, child_in, &mut child_out, deadline_in(5000))
            .unwrap();
        feeder.join().unwrap();
        let _ = child.wait();

        assert_eq!(buf.data(), &payload[..]);
        assert!(!buf.timed_out());
        assert!(!buf.truncated());
    }

    #[test]
    fn test_pump_deadline_with_stalled_transform() {
        // A transform that consumes input but never writes output.
        let mut child = Command::new("sh")
            .args(["-c", "cat > /dev/null; sleep 10"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sh");
        let child_in = child.stdin.take().unwrap();
        let mut child_out = child.stdout.take().unwrap();

        let (mut source_r, mut source_w) = os_pipe();
        source_w.write_all(b"data").unwrap();
        drop(source_w);

        let mut buf = CaptureBuffer::new();
        let result = buf.pump(&mut source_r, child_in, &mut child_out, deadline_in(150));
        assert!(result.is_ok());
        assert!(buf.timed_out());
        assert!(buf.is_empty());

        let _ = child.kill();
        let _ = child.wait();
    }
}
