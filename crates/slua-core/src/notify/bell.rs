use crate::worker::WorkerStatus;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::{self, Write};
use std::time::Duration;

/// Debounced, suspendable terminal bell. Rings (writes BEL to stderr) only
/// for configured trigger states, at most once per debounce interval, and
/// never while suspended around a foreground subprocess.
#[derive(Debug)]
pub struct Bell {
    debounce: Duration,
    last_ring: Option<DateTime<Utc>>,
    suspended: bool,
    trigger_on: HashSet<WorkerStatus>,
}

impl Bell {
    pub fn new(debounce: Duration, states: impl IntoIterator<Item = WorkerStatus>) -> Self {
        Self {
            debounce,
            last_ring: None,
            suspended: false,
            trigger_on: states.into_iter().collect(),
        }
    }

    /// Attempts to ring for the given status. Returns whether the bell
    /// actually rang.
    pub fn ring(&mut self, status: &WorkerStatus, now: DateTime<Utc>) -> bool {
        if self.suspended || !self.trigger_on.contains(status) {
            return false;
        }
        if let Some(last) = self.last_ring {
            let elapsed = now.signed_duration_since(last);
            let debounce =
                chrono::Duration::from_std(self.debounce).unwrap_or(chrono::Duration::MAX);
            if elapsed < debounce {
                return false;
            }
        }

        let mut stderr = io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
        self.last_ring = Some(now);
        true
    }

    /// Disables ringing while the operator is inside a worker console.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
