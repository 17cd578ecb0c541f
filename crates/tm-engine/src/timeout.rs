//! Deadline for a single action.

use duckdb::InterruptHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Interrupts the connection if not disarmed within the deadline.
pub(crate) struct Watchdog {
    disarm: Option<Sender<()>>,
    fired: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn arm(interrupt: Arc<InterruptHandle>, after: Duration) -> Self {
        let (disarm, rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let thread = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(after) {
                flag.store(true, Ordering::SeqCst);
                interrupt.interrupt();
            }
        });
        Self {
            disarm: Some(disarm),
            fired,
            thread: Some(thread),
        }
    }

    /// Stop the watchdog. Returns whether it fired.
    pub(crate) fn disarm(mut self) -> bool {
        self.stop();
        self.fired.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`.
        self.disarm.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
