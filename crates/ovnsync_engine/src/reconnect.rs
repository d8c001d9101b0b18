//! Background reconnection task.

use crate::error::{ClientError, ClientResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One-shot stop flag a sleeping task can wait on.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every waiter.
    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    /// Returns true once the signal is set.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps for `timeout` or until stopped. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// What to log for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureLog {
    /// Log the failure.
    Report,
    /// Log that further failures will not be logged.
    Suppress,
    /// Log nothing.
    Silent,
}

/// Counts failed attempts and gates their logging.
#[derive(Debug, Clone)]
pub struct RetryLog {
    failures: u32,
    cap: u32,
}

impl RetryLog {
    /// Creates a counter that reports the first `cap` failures.
    pub fn new(cap: u32) -> Self {
        Self { failures: 0, cap }
    }

    /// Records a failure.
    pub fn on_failure(&mut self) -> FailureLog {
        let seen = self.failures;
        self.failures = self.failures.saturating_add(1);
        match seen.cmp(&self.cap) {
            std::cmp::Ordering::Less => FailureLog::Report,
            std::cmp::Ordering::Equal => FailureLog::Suppress,
            std::cmp::Ordering::Greater => FailureLog::Silent,
        }
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Handle to a running reconnection loop.
///
/// The loop sleeps one interval, runs one attempt, and repeats until the
/// attempt reports completion or the task is stopped.
#[derive(Debug)]
pub struct ReconnectTask {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl ReconnectTask {
    /// Starts the loop on its own thread.
    ///
    /// `attempt` returns true when no further attempts are needed.
    pub fn spawn<F>(interval: Duration, mut attempt: F) -> ClientResult<Self>
    where
        F: FnMut(&StopSignal) -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal::new());
        let worker_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("ovnsync-reconnect".into())
            .spawn(move || loop {
                if worker_signal.wait_timeout(interval) || attempt(&worker_signal) {
                    break;
                }
            })
            .map_err(|e| ClientError::transport_fatal(format!("cannot start reconnect task: {e}")))?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Returns true while the loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for it, unless called from the loop itself.
    pub fn stop(&mut self) {
        self.signal.stop();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("reconnect task panicked");
        }
    }
}

impl Drop for ReconnectTask {
    fn drop(&mut self) {
        self.stop();
    }
}
