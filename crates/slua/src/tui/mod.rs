//! Interactive dashboard: a single-threaded `tokio::select!` loop that owns
//! all view state and receives roster results and poller snapshots by
//! message. Nothing here mutates engine state beyond trigger requests.

mod theme;
mod view;

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use slua_core::channel::LatestReceiver;
use slua_core::poller::{self, PollerConfig, PollerHandle, PollerUpdate};
use slua_core::source::SourceError;
use slua_core::{Bell, Config, Notification, NotificationRing, SpriteCli, Worker, WorkerSource, WorkerStatus};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Buffered transition events kept for the notification bar.
const RING_CAPACITY: usize = 20;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

pub async fn run_dashboard(source: Arc<SpriteCli>) -> Result<()> {
    let cfg = Config::load().unwrap_or_else(|err| {
        warn!("config: {err} (using defaults)");
        Config::default()
    });

    let cancel = CancellationToken::new();
    let (poller, updates) = poller::start(
        Arc::clone(&source) as Arc<dyn WorkerSource>,
        PollerConfig {
            poll_interval: cfg.detection.poll_interval,
            exec_timeout: cfg.detection.exec_timeout,
            prompt_patterns: cfg.detection.prompt_patterns.clone(),
            max_workers: 10,
        },
        cancel.clone(),
    );

    let bell = cfg
        .notifications
        .terminal_bell
        .then(|| Bell::new(cfg.notifications.bell_debounce, cfg.bell_states()));
    let app = App::new(
        Arc::clone(&source) as Arc<dyn WorkerSource>,
        bell,
        NotificationRing::new(RING_CAPACITY),
    );

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, app, poller, updates).await;
    restore_terminal(&mut terminal)?;
    cancel.cancel();
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_loop(
    terminal: &mut Tui,
    mut app: App,
    poller: PollerHandle,
    mut updates: LatestReceiver<PollerUpdate>,
) -> Result<()> {
    let (roster_tx, mut roster_rx) = mpsc::channel(4);
    spawn_roster_load(&app.source, &roster_tx);

    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        terminal.draw(|frame| view::render(frame, &app))?;

        tokio::select! {
            _ = ticker.tick() => {}
            maybe_event = events.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    if key.kind == KeyEventKind::Press {
                        app.handle_key(key);
                    }
                }
            }
            Some(result) = roster_rx.recv() => app.apply_roster(result),
            Some(update) = updates.recv() => app.apply_update(update),
        }

        if app.should_quit {
            return Ok(());
        }

        if app.refresh_requested {
            app.refresh_requested = false;
            spawn_roster_load(&app.source, &roster_tx);
            poller.trigger_now();
        }

        if let Some(name) = app.pending_console.take() {
            // The event stream competes with the console for stdin; release
            // it for the duration of the shell-out.
            drop(events);
            run_console(terminal, &mut app, &name).await?;
            events = EventStream::new();
            spawn_roster_load(&app.source, &roster_tx);
            poller.trigger_now();
        }
    }
}

fn spawn_roster_load(
    source: &Arc<dyn WorkerSource>,
    tx: &mpsc::Sender<Result<Vec<Worker>, SourceError>>,
) {
    let source = Arc::clone(source);
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = source.list().await;
        let _ = tx.send(result).await;
    });
}

/// Drops the operator into the worker's console, suspending the dashboard
/// and the bell until the subprocess returns.
async fn run_console(terminal: &mut Tui, app: &mut App, name: &str) -> Result<()> {
    app.ring.clear_for(name);
    if let Some(bell) = app.bell.as_mut() {
        bell.suspend();
    }

    restore_terminal(terminal)?;
    let status = app.source.console_cmd(name).status().await;
    *terminal = setup_terminal()?;
    terminal.clear()?;

    let attention = app.has_attention();
    if let Some(bell) = app.bell.as_mut() {
        bell.resume();
        if attention {
            // One catch-up ring for anything still waiting on the operator.
            bell.ring(&WorkerStatus::Waiting, Utc::now());
        }
    }

    match status {
        Err(err) => app.last_err = Some(format!("Console error: {err}")),
        Ok(exit) if !exit.success() => {
            app.last_err = Some(format!("Console error: exited with {exit}"))
        }
        Ok(_) => {}
    }
    Ok(())
}

pub(crate) struct App {
    source: Arc<dyn WorkerSource>,
    pub(crate) workers: Vec<Worker>,
    pub(crate) cursor: usize,
    pub(crate) loading: bool,
    pub(crate) last_err: Option<String>,
    pub(crate) bell: Option<Bell>,
    pub(crate) ring: NotificationRing,
    pub(crate) last_poll: Option<Instant>,
    should_quit: bool,
    refresh_requested: bool,
    pending_console: Option<String>,
}

impl App {
    fn new(source: Arc<dyn WorkerSource>, bell: Option<Bell>, ring: NotificationRing) -> Self {
        Self {
            source,
            workers: Vec::new(),
            cursor: 0,
            loading: true,
            last_err: None,
            bell,
            ring,
            last_poll: None,
            should_quit: false,
            refresh_requested: false,
            pending_console: None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.cursor + 1 < self.workers.len() {
                    self.cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Char('g') => self.cursor = 0,
            KeyCode::Char('G') => {
                if !self.workers.is_empty() {
                    self.cursor = self.workers.len() - 1;
                }
            }
            KeyCode::Char('r') => {
                self.loading = true;
                self.refresh_requested = true;
            }
            KeyCode::Enter => {
                if let Some(worker) = self.workers.get(self.cursor) {
                    self.pending_console = Some(worker.name.clone());
                }
            }
            _ => {}
        }
    }

    fn apply_roster(&mut self, result: Result<Vec<Worker>, SourceError>) {
        self.loading = false;
        match result {
            Ok(workers) => {
                self.workers = workers;
                self.last_err = None;
            }
            Err(err) if self.workers.is_empty() => {
                self.last_err = Some(err.to_string());
            }
            Err(err) => {
                // Keep stale rows, surface the failure.
                self.last_err = Some(format!("Refresh failed: {err}"));
            }
        }
        if self.cursor >= self.workers.len() {
            self.cursor = self.workers.len().saturating_sub(1);
        }
    }

    /// Overlays a poller snapshot onto the roster rows and turns observed
    /// transitions into ring entries and bell attempts.
    fn apply_update(&mut self, update: PollerUpdate) {
        self.last_poll = Some(Instant::now());
        let now = Utc::now();
        for worker in &mut self.workers {
            let Some(polled) = update.states.get(&worker.name) else {
                continue;
            };
            if let Some(status) = &polled.status {
                worker.status = status.clone();
            }
            if polled.is_transition() {
                if let (Some(old), Some(new)) = (&polled.previous_status, &polled.status) {
                    self.ring.push(Notification {
                        worker: worker.name.clone(),
                        old_status: old.clone(),
                        new_status: new.clone(),
                        timestamp: now,
                    });
                    if let Some(bell) = self.bell.as_mut() {
                        bell.ring(new, now);
                    }
                }
            }
        }
    }

    pub(crate) fn has_attention(&self) -> bool {
        self.workers.iter().any(|w| w.status.is_attention())
    }

    pub(crate) fn attention_count(&self) -> usize {
        self.workers.iter().filter(|w| w.status.is_attention()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use slua_core::state::WorkerState;
    use std::collections::HashMap;

    struct StubSource;

    #[async_trait]
    impl WorkerSource for StubSource {
        async fn list(&self) -> Result<Vec<Worker>, SourceError> {
            Ok(Vec::new())
        }

        async fn exec_status(&self, _name: &str, _script: &str) -> Result<String, SourceError> {
            Ok(String::new())
        }

        fn console_cmd(&self, name: &str) -> tokio::process::Command {
            let mut cmd = tokio::process::Command::new("echo");
            cmd.arg(name.to_string());
            cmd
        }
    }

    fn worker(name: &str, status: WorkerStatus) -> Worker {
        Worker {
            id: format!("id-{name}"),
            name: name.to_string(),
            status,
            created_at: None,
            region: String::new(),
        }
    }

    fn app_with(workers: Vec<Worker>) -> App {
        let mut app = App::new(
            Arc::new(StubSource) as Arc<dyn WorkerSource>,
            None,
            NotificationRing::new(RING_CAPACITY),
        );
        app.apply_roster(Ok(workers));
        app
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn jk_navigation_clamps_at_both_ends() {
        let mut app = app_with(vec![
            worker("first", WorkerStatus::Working),
            worker("second", WorkerStatus::Working),
            worker("third", WorkerStatus::Working),
        ]);

        assert_eq!(app.cursor, 0);
        app.handle_key(press(KeyCode::Char('j')));
        app.handle_key(press(KeyCode::Char('j')));
        assert_eq!(app.cursor, 2);
        app.handle_key(press(KeyCode::Char('j')));
        assert_eq!(app.cursor, 2, "clamped at bottom");

        app.handle_key(press(KeyCode::Char('k')));
        assert_eq!(app.cursor, 1);
        app.handle_key(press(KeyCode::Char('k')));
        app.handle_key(press(KeyCode::Char('k')));
        assert_eq!(app.cursor, 0, "clamped at top");
    }

    #[test]
    fn g_and_shift_g_jump_to_edges() {
        let mut app = app_with(vec![
            worker("a", WorkerStatus::Working),
            worker("b", WorkerStatus::Working),
            worker("c", WorkerStatus::Working),
        ]);

        app.handle_key(KeyEvent::new(KeyCode::Char('G'), KeyModifiers::SHIFT));
        assert_eq!(app.cursor, 2);
        app.handle_key(press(KeyCode::Char('g')));
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn quit_keys() {
        let mut app = app_with(vec![]);
        app.handle_key(press(KeyCode::Char('q')));
        assert!(app.should_quit);

        let mut app = app_with(vec![]);
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn enter_selects_worker_for_console() {
        let mut app = app_with(vec![
            worker("a", WorkerStatus::Working),
            worker("b", WorkerStatus::Working),
        ]);
        app.handle_key(press(KeyCode::Char('j')));
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.pending_console.as_deref(), Some("b"));

        let mut empty = app_with(vec![]);
        empty.handle_key(press(KeyCode::Enter));
        assert_eq!(empty.pending_console, None);
    }

    #[test]
    fn refresh_key_marks_loading() {
        let mut app = app_with(vec![]);
        app.handle_key(press(KeyCode::Char('r')));
        assert!(app.loading);
        assert!(app.refresh_requested);
    }

    #[test]
    fn roster_shrink_clamps_cursor() {
        let mut app = app_with(vec![
            worker("a", WorkerStatus::Working),
            worker("b", WorkerStatus::Working),
            worker("c", WorkerStatus::Working),
        ]);
        app.handle_key(KeyEvent::new(KeyCode::Char('G'), KeyModifiers::SHIFT));
        assert_eq!(app.cursor, 2);

        app.apply_roster(Ok(vec![worker("a", WorkerStatus::Working)]));
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn first_load_error_vs_refresh_error() {
        let failure = || SourceError::Command {
            command: "sprite api /sprites".to_string(),
            message: "boom".to_string(),
        };

        let mut app = app_with(vec![]);
        app.apply_roster(Err(failure()));
        assert!(app.workers.is_empty());
        let first = app.last_err.clone().expect("first load error surfaced");
        assert!(!first.starts_with("Refresh failed"));

        let mut app = app_with(vec![worker("a", WorkerStatus::Working)]);
        app.apply_roster(Err(failure()));
        assert_eq!(app.workers.len(), 1, "stale data kept on refresh failure");
        assert!(app
            .last_err
            .clone()
            .expect("refresh error surfaced")
            .starts_with("Refresh failed"));
    }

    #[test]
    fn update_overlays_status_and_records_transition() {
        let mut app = app_with(vec![worker("web-app", WorkerStatus::Working)]);

        let mut state = WorkerState::new("web-app");
        state.record_success(WorkerStatus::Working, Utc::now());
        state.record_success(WorkerStatus::Waiting, Utc::now());
        let mut states = HashMap::new();
        states.insert("web-app".to_string(), state);

        app.apply_update(PollerUpdate { states });

        assert_eq!(app.workers[0].status, WorkerStatus::Waiting);
        assert_eq!(app.ring.len(), 1);
        let visible = app.ring.visible();
        assert_eq!(visible[0].old_status, WorkerStatus::Working);
        assert_eq!(visible[0].new_status, WorkerStatus::Waiting);
        assert!(app.has_attention());
        assert_eq!(app.attention_count(), 1);
    }

    #[test]
    fn update_without_transition_stays_quiet() {
        let mut app = app_with(vec![worker("web-app", WorkerStatus::Working)]);

        let mut state = WorkerState::new("web-app");
        state.record_success(WorkerStatus::Working, Utc::now());
        let mut states = HashMap::new();
        states.insert("web-app".to_string(), state);

        app.apply_update(PollerUpdate { states });

        assert_eq!(app.workers[0].status, WorkerStatus::Working);
        assert!(app.ring.is_empty());
        assert!(!app.has_attention());
    }

    #[test]
    fn update_ignores_unknown_workers() {
        let mut app = app_with(vec![worker("web-app", WorkerStatus::Working)]);

        let mut states = HashMap::new();
        states.insert("ghost".to_string(), WorkerState::new("ghost"));
        app.apply_update(PollerUpdate { states });

        assert_eq!(app.workers[0].status, WorkerStatus::Working);
        assert!(app.ring.is_empty());
    }
}
