use crate::worker::WorkerStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Maximum interval between probe attempts for a failing worker.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Consecutive failures before a worker is marked `UNREACHABLE`.
pub const UNREACHABLE_THRESHOLD: u32 = 3;

/// Polled state of a single worker, owned by the poller engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerState {
    pub name: String,
    pub status: Option<WorkerStatus>,
    pub previous_status: Option<WorkerStatus>,
    pub last_poll_time: Option<DateTime<Utc>>,
    pub consec_fails: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    /// Exit code detail accompanying the `ERROR` state.
    pub error_detail: String,
}

impl WorkerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: None,
            previous_status: None,
            last_poll_time: None,
            consec_fails: 0,
            backoff_until: None,
            error_detail: String::new(),
        }
    }

    /// True when the worker is ready to be probed again.
    pub fn should_poll(&self, now: DateTime<Utc>) -> bool {
        match self.backoff_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Records a successfully classified probe. Returns whether the status
    /// changed (a transition occurred).
    pub fn record_success(&mut self, status: WorkerStatus, now: DateTime<Utc>) -> bool {
        self.previous_status = self.status.clone();
        self.status = Some(status);
        self.last_poll_time = Some(now);
        self.consec_fails = 0;
        self.backoff_until = None;
        self.is_transition()
    }

    /// Records a failed probe attempt and schedules the next attempt with
    /// exponential backoff: `base × 2^(fails−1)`, capped at [`MAX_BACKOFF`].
    pub fn record_failure(&mut self, base_interval: Duration, now: DateTime<Utc>) {
        self.consec_fails += 1;
        self.last_poll_time = Some(now);

        let mut backoff = base_interval;
        for _ in 1..self.consec_fails {
            backoff *= 2;
            if backoff >= MAX_BACKOFF {
                backoff = MAX_BACKOFF;
                break;
            }
        }
        backoff = backoff.min(MAX_BACKOFF);
        let delta = chrono::Duration::from_std(backoff)
            .unwrap_or_else(|_| chrono::Duration::seconds(MAX_BACKOFF.as_secs() as i64));
        self.backoff_until = Some(now + delta);

        if self.consec_fails >= UNREACHABLE_THRESHOLD {
            self.previous_status = self.status.clone();
            self.status = Some(WorkerStatus::Unreachable);
        }
    }

    /// True when the current status differs from a previously observed one.
    pub fn is_transition(&self) -> bool {
        match (&self.previous_status, &self.status) {
            (Some(previous), Some(current)) => previous != current,
            _ => false,
        }
    }
}
