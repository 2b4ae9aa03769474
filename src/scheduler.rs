//! Fixed-interval background tasks with explicit stop semantics.
//!
//! Each task owns one named thread. The thread waits on a stop channel until
//! the next tick deadline; a timeout means "tick", a message or a dropped
//! sender means "stop". Deadlines advance by whole intervals from the start,
//! so ticks do not drift with the time spent inside them. A tick may also end
//! the task by returning `ControlFlow::Break`, which is how the restore-check
//! cycle cancels itself.

use crate::log_debug;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::ops::ControlFlow;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a running periodic task.
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` on its own thread, first firing one `interval` from now.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));
        let thread_name = format!("autoduck-{name}");
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    match stop_rx.recv_deadline(deadline) {
                        Err(RecvTimeoutError::Timeout) => {
                            if tick().is_break() {
                                break;
                            }
                            deadline += interval;
                            let now = Instant::now();
                            // Overran a whole interval: skip missed ticks.
                            if deadline <= now {
                                deadline = now + interval;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .with_context(|| format!("failed to spawn {thread_name} thread"))?;
        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once the tick broke out of the loop or a stop was processed.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Ask the thread to exit without waiting for it. Safe to call while
    /// holding a lock the tick function also takes.
    pub fn cancel(mut self) {
        self.signal_stop();
        self.handle.take();
    }

    /// Ask the thread to exit and wait until it has.
    pub fn stop(mut self) {
        self.signal_stop();
        self.join();
    }

    fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A task dropped from inside its own tick cannot wait for itself.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log_debug(&format!("periodic task '{}' panicked", self.name));
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.signal_stop();
        self.join();
    }
}
