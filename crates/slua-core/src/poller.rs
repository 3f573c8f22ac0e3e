//! Background state-detection engine. One supervisor task periodically fans
//! out probe executions across the roster with bounded concurrency, folds the
//! classified results into per-worker state records, and publishes immutable
//! snapshots over a latest-wins channel.

use crate::channel::{bounded_latest, LatestReceiver, LatestSender};
use crate::probe::{build_probe_script, classify_output};
use crate::source::{SourceError, WorkerSource};
use crate::state::WorkerState;
use crate::worker::Worker;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Snapshot queue depth. A consumer more than this many cycles behind starts
/// losing the oldest snapshots (latest-wins).
const UPDATE_CAPACITY: usize = 4;

const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub exec_timeout: Duration,
    pub prompt_patterns: Vec<String>,
    /// Concurrent probe bound; 0 selects the default of 10.
    pub max_workers: usize,
}

/// Immutable by-value view of every per-worker record, emitted once per cycle.
#[derive(Debug, Clone)]
pub struct PollerUpdate {
    pub states: HashMap<String, WorkerState>,
}

/// Handle held by the UI: requests immediate cycles and joins the supervisor.
pub struct PollerHandle {
    trigger_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Fire-and-forget request for an immediate cycle. Coalesces: while a
    /// trigger is already pending the request is dropped.
    pub fn trigger_now(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Waits for the supervisor task to finish after cancellation.
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

struct Poller {
    source: Arc<dyn WorkerSource>,
    cfg: PollerConfig,
    script: String,
    states: Mutex<HashMap<String, WorkerState>>,
    update_tx: LatestSender<PollerUpdate>,
}

/// Builds the engine and spawns its supervisor task. The task runs one
/// immediate cycle, then cycles every `poll_interval` until `cancel` fires;
/// a manual trigger runs a cycle and re-arms the timer.
pub fn start(
    source: Arc<dyn WorkerSource>,
    mut cfg: PollerConfig,
    cancel: CancellationToken,
) -> (PollerHandle, LatestReceiver<PollerUpdate>) {
    if cfg.max_workers == 0 {
        cfg.max_workers = DEFAULT_MAX_WORKERS;
    }
    let (update_tx, update_rx) = bounded_latest(UPDATE_CAPACITY);
    let (trigger_tx, trigger_rx) = mpsc::channel(1);

    let poller = Arc::new(Poller {
        script: build_probe_script(&cfg.prompt_patterns),
        source,
        cfg,
        states: Mutex::new(HashMap::new()),
        update_tx,
    });

    let task = tokio::spawn(poller.run(cancel, trigger_rx));
    (PollerHandle { trigger_tx, task }, update_rx)
}

impl Poller {
    async fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut trigger_rx: mpsc::Receiver<()>,
    ) {
        if self.cycle_or_cancelled(&cancel).await {
            return;
        }

        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; the initial cycle already ran.
        ticker.reset();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.cycle_or_cancelled(&cancel).await {
                        return;
                    }
                }
                Some(()) = trigger_rx.recv() => {
                    if self.cycle_or_cancelled(&cancel).await {
                        return;
                    }
                    ticker.reset();
                }
            }
        }
    }

    /// Runs one cycle, racing it against cancellation. Dropping the cycle
    /// future aborts its probe tasks. Returns true when cancelled.
    async fn cycle_or_cancelled(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = self.cycle() => false,
        }
    }

    async fn cycle(&self) {
        let roster = match self.source.list().await {
            Ok(roster) => roster,
            Err(err) => {
                // Attributed to the source, not to any worker: no failures
                // recorded, no snapshot emitted.
                debug!("roster fetch failed, skipping cycle: {err}");
                return;
            }
        };

        let probeable: Vec<&Worker> = roster.iter().filter(|w| w.status.is_probeable()).collect();
        if probeable.is_empty() {
            self.emit_update();
            return;
        }

        let now = Utc::now();
        let due: Vec<String> = {
            let mut states = self.states.lock().expect("state table lock poisoned");
            probeable
                .iter()
                .filter_map(|worker| {
                    let state = states
                        .entry(worker.name.clone())
                        .or_insert_with(|| WorkerState::new(&worker.name));
                    state.should_poll(now).then(|| worker.name.clone())
                })
                .collect()
        };

        let semaphore = Arc::new(Semaphore::new(self.cfg.max_workers));
        let mut probes: JoinSet<(String, Result<String, SourceError>)> = JoinSet::new();
        for name in due {
            let source = Arc::clone(&self.source);
            let script = self.script.clone();
            let semaphore = Arc::clone(&semaphore);
            let exec_timeout = self.cfg.exec_timeout;
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome =
                    match tokio::time::timeout(exec_timeout, source.exec_status(&name, &script))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Timeout(exec_timeout)),
                    };
                (name, outcome)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok((name, outcome)) = joined else {
                warn!("probe task failed to join");
                continue;
            };
            let mut states = self.states.lock().expect("state table lock poisoned");
            let Some(state) = states.get_mut(&name) else {
                continue;
            };
            match outcome {
                Ok(output) => {
                    let (status, detail) = classify_output(&output);
                    state.record_success(status, now);
                    state.error_detail = detail;
                }
                Err(err) => {
                    debug!(worker = %name, "probe failed: {err}");
                    state.record_failure(self.cfg.poll_interval, now);
                }
            }
        }

        self.emit_update();
    }

    fn emit_update(&self) {
        let states = self
            .states
            .lock()
            .expect("state table lock poisoned")
            .clone();
        self.update_tx.send(PollerUpdate { states });
    }
}
