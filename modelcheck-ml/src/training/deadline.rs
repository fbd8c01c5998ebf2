//! Cooperative training deadline.
//!
//! The orchestrator arms a watchdog thread that raises a [`StopSignal`] once
//! the allotted time has elapsed. Learners poll the signal at safe points and
//! return the best model they have so far; an elapsed deadline is not an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared stop flag polled by learners.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Watchdog raising a stop signal after a duration.
///
/// Dropping the guard cancels the watchdog and joins its thread.
#[derive(Debug)]
pub struct DeadlineGuard {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineGuard {
    pub fn arm(signal: StopSignal, after: Duration) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(after) {
                tracing::info!(after_secs = after.as_secs_f64(), "Training deadline reached");
                signal.raise();
            }
        });
        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the watchdog.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
