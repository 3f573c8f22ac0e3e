use crate::worker::WorkerStatus;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// How many of the most recent events the dashboard footer shows.
const VISIBLE_WINDOW: usize = 2;

/// A single observed state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub worker: String,
    pub old_status: WorkerStatus,
    pub new_status: WorkerStatus,
    pub timestamp: DateTime<Utc>,
}

/// Bounded FIFO of recent transition events.
#[derive(Debug)]
pub struct NotificationRing {
    items: VecDeque<Notification>,
    capacity: usize,
}

impl NotificationRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Appends an event, dropping the oldest entries when over capacity.
    pub fn push(&mut self, notification: Notification) {
        self.items.push_back(notification);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// The tail window of events shown in the UI, in insertion order.
    pub fn visible(&self) -> Vec<&Notification> {
        let skip = self.items.len().saturating_sub(VISIBLE_WINDOW);
        self.items.iter().skip(skip).collect()
    }

    /// Removes every queued event for the named worker. Called when the
    /// operator opens that worker's console and the pending notices go stale.
    pub fn clear_for(&mut self, name: &str) {
        self.items.retain(|n| n.worker != name);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Formats the visible events into a single line fitting `width` chars.
    pub fn render(&self, width: usize, now: DateTime<Utc>) -> String {
        let visible = self.visible();
        if visible.is_empty() {
            return String::new();
        }

        let line = visible
            .iter()
            .map(|n| format_notification(n, now))
            .collect::<Vec<_>>()
            .join(" │ ");

        let chars: Vec<char> = line.chars().collect();
        if chars.len() <= width {
            return line;
        }
        if width > 1 {
            let mut truncated: String = chars[..width - 1].iter().collect();
            truncated.push('…');
            truncated
        } else {
            chars[..width].iter().collect()
        }
    }
}

fn format_notification(n: &Notification, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(n.timestamp);
    let age_str = if age.num_seconds() < 60 {
        format!("{}s ago", age.num_seconds().max(0))
    } else if age.num_minutes() < 60 {
        format!("{}m ago", age.num_minutes())
    } else {
        format!("{}h ago", age.num_hours())
    };
    format!(
        "● {}: {} → {} ({})",
        n.worker, n.old_status, n.new_status, age_str
    )
}
