//! Poller engine integration tests against a scriptable fake worker source.

use async_trait::async_trait;
use slua_core::poller::{self, PollerConfig, PollerUpdate};
use slua_core::source::{SourceError, WorkerSource};
use slua_core::worker::{normalize_status, Worker, WorkerStatus};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct FakeSource {
    workers: Mutex<Vec<Worker>>,
    list_error: AtomicBool,
    exec_output: Mutex<String>,
    exec_error: AtomicBool,
    exec_calls: AtomicUsize,
}

impl FakeSource {
    fn new(workers: Vec<Worker>) -> Arc<Self> {
        Arc::new(Self {
            workers: Mutex::new(workers),
            list_error: AtomicBool::new(false),
            exec_output: Mutex::new("WORKING".to_string()),
            exec_error: AtomicBool::new(false),
            exec_calls: AtomicUsize::new(0),
        })
    }

    fn set_exec_output(&self, output: &str) {
        *self.exec_output.lock().unwrap() = output.to_string();
    }

    fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerSource for FakeSource {
    async fn list(&self) -> Result<Vec<Worker>, SourceError> {
        if self.list_error.load(Ordering::SeqCst) {
            return Err(SourceError::Command {
                command: "fake list".to_string(),
                message: "transient outage".to_string(),
            });
        }
        Ok(self.workers.lock().unwrap().clone())
    }

    async fn exec_status(&self, _name: &str, _script: &str) -> Result<String, SourceError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if self.exec_error.load(Ordering::SeqCst) {
            return Err(SourceError::Command {
                command: "fake exec".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.exec_output.lock().unwrap().clone())
    }

    fn console_cmd(&self, name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("echo");
        cmd.arg(name.to_string());
        cmd
    }
}

fn worker(name: &str, raw_status: &str) -> Worker {
    Worker {
        id: format!("id-{name}"),
        name: name.to_string(),
        status: normalize_status(raw_status),
        created_at: None,
        region: "ord".to_string(),
    }
}

fn config(poll_interval: Duration) -> PollerConfig {
    PollerConfig {
        poll_interval,
        exec_timeout: Duration::from_secs(2),
        prompt_patterns: vec!["Y/n".to_string()],
        max_workers: 2,
    }
}

async fn next_update(
    rx: &mut slua_core::channel::LatestReceiver<PollerUpdate>,
) -> PollerUpdate {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for poller update")
        .expect("update channel closed")
}

#[tokio::test(start_paused = true)]
async fn delivers_initial_update() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    let cancel = CancellationToken::new();
    let (_handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    let update = next_update(&mut updates).await;
    let state = update.states.get("web-app").expect("web-app state present");
    assert_eq!(state.status, Some(WorkerStatus::Working));
    assert!(!state.is_transition());

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn detects_transition_and_previous_status() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    let cancel = CancellationToken::new();
    let (handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    let first = next_update(&mut updates).await;
    assert_eq!(
        first.states["web-app"].status,
        Some(WorkerStatus::Working)
    );

    source.set_exec_output("WAITING");
    handle.trigger_now();

    let second = next_update(&mut updates).await;
    let state = &second.states["web-app"];
    assert_eq!(state.status, Some(WorkerStatus::Waiting));
    assert_eq!(state.previous_status, Some(WorkerStatus::Working));
    assert!(state.is_transition());

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn trigger_burst_coalesces_to_one_cycle() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    let cancel = CancellationToken::new();
    let (handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    next_update(&mut updates).await;
    assert_eq!(source.exec_calls(), 1);

    for _ in 0..10 {
        handle.trigger_now();
    }
    next_update(&mut updates).await;

    // Ten back-to-back triggers coalesce into at most one pending signal.
    assert_eq!(source.exec_calls(), 2);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn skips_non_probeable_workers() {
    let source = FakeSource::new(vec![
        worker("sleepy", "stopped"),
        worker("newborn", "creating"),
    ]);
    let cancel = CancellationToken::new();
    let (_handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    let update = next_update(&mut updates).await;
    assert!(update.states.is_empty(), "no records for unprobed workers");
    assert_eq!(source.exec_calls(), 0);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn probes_raw_running_passthrough() {
    let mut raw = worker("raw", "running");
    raw.status = WorkerStatus::Other("RUNNING".to_string());
    let source = FakeSource::new(vec![raw]);
    let cancel = CancellationToken::new();
    let (_handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    let update = next_update(&mut updates).await;
    assert!(update.states.contains_key("raw"));
    assert_eq!(source.exec_calls(), 1);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn roster_failure_skips_cycle_silently() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    source.list_error.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();
    let (handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    // No snapshot while the source is down, and no failures recorded.
    assert!(timeout(Duration::from_secs(30), updates.recv()).await.is_err());
    assert_eq!(source.exec_calls(), 0);

    source.list_error.store(false, Ordering::SeqCst);
    handle.trigger_now();

    let update = next_update(&mut updates).await;
    let state = &update.states["web-app"];
    assert_eq!(state.status, Some(WorkerStatus::Working));
    assert_eq!(state.consec_fails, 0);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_back_off_then_recover() {
    let source = FakeSource::new(vec![worker("flaky", "running")]);
    source.exec_error.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();
    let (_handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(5)),
        cancel.clone(),
    );

    let mut unreachable = None;
    for _ in 0..20 {
        let update = next_update(&mut updates).await;
        let state = &update.states["flaky"];
        if state.status == Some(WorkerStatus::Unreachable) {
            unreachable = Some(state.clone());
            break;
        }
    }
    let state = unreachable.expect("worker should become UNREACHABLE");
    assert_eq!(state.consec_fails, 3);
    assert!(state.backoff_until.is_some());

    source.exec_error.store(false, Ordering::SeqCst);

    let mut recovered = None;
    for _ in 0..20 {
        let update = next_update(&mut updates).await;
        let state = &update.states["flaky"];
        if state.status == Some(WorkerStatus::Working) {
            recovered = Some(state.clone());
            break;
        }
    }
    let state = recovered.expect("worker should recover after a success");
    assert_eq!(state.previous_status, Some(WorkerStatus::Unreachable));
    assert_eq!(state.consec_fails, 0);
    assert_eq!(state.backoff_until, None);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn backed_off_worker_is_not_reprobed_immediately() {
    let source = FakeSource::new(vec![worker("flaky", "running")]);
    source.exec_error.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();
    let (handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(3600)),
        cancel.clone(),
    );

    next_update(&mut updates).await;
    assert_eq!(source.exec_calls(), 1);

    // Backoff is a full hour; an immediate trigger must skip the probe but
    // still emit a snapshot.
    handle.trigger_now();
    let update = next_update(&mut updates).await;
    assert_eq!(source.exec_calls(), 1);
    assert_eq!(update.states["flaky"].consec_fails, 1);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn latest_wins_when_consumer_never_reads() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    let cancel = CancellationToken::new();
    let (_handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(5)),
        cancel.clone(),
    );

    // Let many cycles run without reading a single update.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(updates.len() <= 4, "queue bounded at capacity");
    assert!(source.exec_calls() > 4, "supervisor kept making progress");

    source.set_exec_output("FINISHED");
    tokio::time::sleep(Duration::from_secs(30)).await;

    let mut last = None;
    while let Some(update) = updates.try_recv() {
        last = Some(update);
    }
    let last = last.expect("at least one queued update");
    assert_eq!(
        last.states["web-app"].status,
        Some(WorkerStatus::Finished),
        "most recent snapshot survives"
    );

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_supervisor() {
    let source = FakeSource::new(vec![worker("web-app", "running")]);
    let cancel = CancellationToken::new();
    let (handle, mut updates) = poller::start(
        source.clone() as Arc<dyn WorkerSource>,
        config(Duration::from_secs(5)),
        cancel.clone(),
    );

    next_update(&mut updates).await;
    cancel.cancel();

    timeout(Duration::from_secs(5), handle.stopped())
        .await
        .expect("supervisor should stop after cancellation");

    // Sender is gone: the channel drains and then closes.
    while updates.try_recv().is_some() {}
    assert!(timeout(Duration::from_secs(30), updates.recv())
        .await
        .expect("closed channel should not block")
        .is_none());
}
