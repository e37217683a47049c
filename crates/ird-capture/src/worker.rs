//! Worker pool for blocking producers.
//!
//! Some sections come from blocking system calls that cannot be polled.
//! They run on dedicated worker threads and hand their result back through
//! a [`TaskHandle`] the pipeline can await with a deadline, instead of the
//! pipeline spinning on a pipe. An abandoned task keeps its thread busy
//! until the blocking call returns; the pool survives because the thread
//! simply picks up the next job afterwards.

use crate::error::{CaptureError, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Deadline-awaitable handle for a submitted task.
pub struct TaskHandle<T> {
    rx: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task's result until `deadline`. `None` means the task
    /// had not finished in time; the task itself keeps running.
    pub fn wait_until(&self, deadline: Instant) -> Option<T> {
        let now = Instant::now();
        let timeout = deadline.saturating_duration_since(now);
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Fixed-size pool of worker threads for blocking section producers.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let threads = (0..threads.max(1))
            .map(|i| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("section-worker-{}", i))
                    .spawn(move || worker_loop(&rx))
                    .expect("spawn worker thread")
            })
            .collect();
        Self {
            tx: Some(tx),
            threads,
        }
    }

    /// Run `task` on a worker thread; the returned handle delivers its
    /// result.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(CaptureError::WorkerUnavailable)?;
        let (result_tx, result_rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            // The receiver may have given up on the deadline; a dead
            // channel is not the task's problem.
            let _ = result_tx.send(task());
        });
        tx.send(job).map_err(|_| CaptureError::WorkerUnavailable)?;
        Ok(TaskHandle { rx: result_rx })
    }

    /// Stop accepting work and join every worker.
    pub fn shutdown(mut self) {
        self.tx = None;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        debug!("worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.tx = None;
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let guard = rx.lock().unwrap_or_else(|e| e.into_inner());
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 6 * 7).unwrap();
        assert_eq!(handle.wait_until(deadline_in(1000)), Some(42));
        pool.shutdown();
    }

    #[test]
    fn test_wait_respects_deadline() {
        let pool = WorkerPool::new(1);
        let handle = pool
            .submit(|| {
                thread::sleep(Duration::from_millis(300));
                1
            })
            .unwrap();
        assert_eq!(handle.wait_until(deadline_in(30)), None);
        // The task is still running and finishes later.
        assert_eq!(handle.wait_until(deadline_in(2000)), Some(1));
        pool.shutdown();
    }

    #[test]
    fn test_pool_survives_abandoned_task() {
        let pool = WorkerPool::new(1);
        let slow = pool
            .submit(|| thread::sleep(Duration::from_millis(100)))
            .unwrap();
        drop(slow);
        let handle = pool.submit(|| "next").unwrap();
        assert_eq!(handle.wait_until(deadline_in(2000)), Some("next"));
        pool.shutdown();
    }

    #[test]
    fn test_parallel_tasks() {
        let pool = WorkerPool::new(4);
        let handles: Vec<_> = (0..8)
            .map(|i| pool.submit(move || i * 2).unwrap())
            .collect();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(h.wait_until(deadline_in(2000)), Some(i * 2));
        }
        pool.shutdown();
    }
}
