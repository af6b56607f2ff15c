use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use subsync_runtime::{RestartError, RestartMechanism};

use crate::Journal;

/// Records every restart request; can be switched to fail.
#[derive(Debug)]
pub struct RecordingRestart {
    requests: Mutex<Vec<Duration>>,
    unavailable: AtomicBool,
    journal: Journal,
}

impl RecordingRestart {
    pub fn new(journal: Journal) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            journal,
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Duration> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.requests().len()
    }
}

impl RestartMechanism for RecordingRestart {
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError> {
        if self.unavailable.load(Ordering::SeqCst) {
            self.journal.push("restart_failed");
            return Err(RestartError("platform restart not available".to_string()));
        }
        self.journal.push("restart");
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(delay);
        Ok(())
    }
}
