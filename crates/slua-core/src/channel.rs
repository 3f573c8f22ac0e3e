//! Bounded latest-wins channel used to fan snapshots out of the poller.
//!
//! `send` never blocks and never stalls the producer: when the queue is at
//! capacity the oldest entry is dropped first (drain one, then push). A slow
//! or absent consumer therefore only ever costs stale snapshots.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

/// Creates a latest-wins channel holding at most `capacity` queued values.
pub fn bounded_latest<T>(capacity: usize) -> (LatestSender<T>, LatestReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        notify: Notify::new(),
        capacity: capacity.max(1),
        closed: AtomicBool::new(false),
    });
    (
        LatestSender {
            shared: Arc::clone(&shared),
        },
        LatestReceiver { shared },
    )
}

pub struct LatestSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestSender<T> {
    /// Non-blocking send. At capacity, the oldest queued value is dropped so
    /// the most recent value always fits.
    pub fn send(&self, value: T) {
        {
            let mut queue = self.shared.queue.lock().expect("update queue lock poisoned");
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
            }
            queue.push_back(value);
        }
        self.shared.notify.notify_one();
    }
}

impl<T> Drop for LatestSender<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

pub struct LatestReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestReceiver<T> {
    /// Receives the next queued value, waiting if the queue is empty.
    /// Returns `None` once the sender is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.try_recv() {
                return Some(value);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.shared
            .queue
            .lock()
            .expect("update queue lock poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared
            .queue
            .lock()
            .expect("update queue lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
