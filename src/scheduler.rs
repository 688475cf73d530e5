//! # Scheduler Module
//!
//! One-shot delayed tasks with an explicit cancellation token, and the restart policy built on
//! top of them.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::trace;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Delay between a live preview connection ending and the restart attempt.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// Handle to a task scheduled with [`schedule_after`].
///
/// Dropping the handle cancels the task.
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,

    /// Wakes the timer thread early, it is never sent a value after firing
    wake_tx: Sender<()>
}

/// Schedules restarts of an ended stream after a fixed delay.
///
/// The delay does not grow with consecutive failures.
#[derive(Debug, Clone, Copy)]
pub struct RestartScheduler {
    delay: Duration
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl TaskHandle {
    /// Cancel the task. Once this returns the task will not start, even if its delay has
    /// already elapsed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl RestartScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` to run once the restart delay has elapsed.
    pub fn schedule<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static
    {
        schedule_after(self.delay, task)
    }
}

impl Default for RestartScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RESTART_DELAY)
    }
}

// -----------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Run `task` on a separate thread after `delay`, unless the returned handle is cancelled or
/// dropped first.
pub fn schedule_after<F>(delay: Duration, task: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let (wake_tx, wake_rx) = channel();

    let flag = cancelled.clone();
    thread::spawn(move || {
        match wake_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) if !flag.load(Ordering::SeqCst) => task(),
            _ => trace!("Delayed task cancelled")
        }
    });

    TaskHandle { cancelled, wake_tx }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
