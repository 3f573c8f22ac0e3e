use super::theme;
use super::App;
use chrono::Utc;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

const COL_NAME: usize = 24;
const COL_STATUS: usize = 14;
const COL_UPTIME: usize = 11;
const MIN_WIDTH: u16 = 80;
const MIN_HEIGHT: u16 = 24;

/// Column for the activity hint only on wide terminals.
const ACTIVITY_MIN_WIDTH: u16 = 100;

pub(crate) fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let message = format!(
            "\n  Terminal too small (need {MIN_WIDTH}x{MIN_HEIGHT}, got {}x{})",
            area.width, area.height
        );
        frame.render_widget(Paragraph::new(message), area);
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // subheader
            Constraint::Length(1), // column headers
            Constraint::Length(1), // separator
            Constraint::Min(0),    // worker list
            Constraint::Length(1), // notification bar
            Constraint::Length(1), // key help
        ])
        .split(area);

    frame.render_widget(render_title(app, area.width as usize), rows[0]);
    frame.render_widget(render_subheader(app), rows[1]);
    frame.render_widget(render_column_headers(area.width), rows[2]);
    frame.render_widget(render_separator(area.width), rows[3]);
    render_worker_list(frame, app, rows[4]);
    frame.render_widget(render_notification_bar(app, area.width as usize), rows[5]);
    frame.render_widget(render_help(), rows[6]);
}

fn render_title(app: &App, width: usize) -> Paragraph<'static> {
    let title = "Slua Sí";
    let attention = app.attention_count();
    let badge = if attention > 0 {
        format!("[{attention} need attention]")
    } else {
        String::new()
    };

    let gap = width
        .saturating_sub(title.chars().count() + badge.chars().count())
        .max(1);
    let line = Line::from(vec![
        Span::styled(title.to_string(), theme::header()),
        Span::raw(" ".repeat(gap)),
        Span::styled(badge, theme::badge()),
    ]);
    Paragraph::new(line)
}

fn render_subheader(app: &App) -> Paragraph<'static> {
    let mut status = if app.loading {
        "Loading...".to_string()
    } else if app.last_err.is_some() {
        "Error".to_string()
    } else {
        "Connected".to_string()
    };
    if let Some(last_poll) = app.last_poll {
        status.push_str(&format!(" · Last poll: {}s ago", last_poll.elapsed().as_secs()));
    }
    Paragraph::new(Line::styled(status, theme::muted()))
}

fn render_column_headers(width: u16) -> Paragraph<'static> {
    let mut header = format!(
        "  {}{}{}",
        pad_right("NAME", COL_NAME - 2),
        pad_right("STATUS", COL_STATUS),
        pad_right("UPTIME", COL_UPTIME),
    );
    if width >= ACTIVITY_MIN_WIDTH {
        header.push_str("LAST ACTIVITY");
    }
    Paragraph::new(Line::styled(header, theme::column_header()))
}

fn render_separator(width: u16) -> Paragraph<'static> {
    let mut sep = format!(
        "  {}{}{}",
        pad_right(&"─".repeat(COL_NAME - 3), COL_NAME - 2),
        pad_right(&"─".repeat(COL_STATUS - 1), COL_STATUS),
        pad_right(&"─".repeat(COL_UPTIME - 1), COL_UPTIME),
    );
    if width >= ACTIVITY_MIN_WIDTH {
        sep.push_str(&"─".repeat(16));
    }
    Paragraph::new(Line::styled(sep, theme::muted()))
}

fn render_worker_list(frame: &mut Frame, app: &App, area: Rect) {
    if app.loading && app.workers.is_empty() {
        frame.render_widget(Paragraph::new("  Loading workers..."), area);
        return;
    }
    if app.workers.is_empty() {
        let message = "  No workers running.\n\n  Use 'sprite create <name>' to get started.";
        frame.render_widget(Paragraph::new(message), area);
        return;
    }

    let height = area.height as usize;
    let show_activity = frame.area().width >= ACTIVITY_MIN_WIDTH;
    let now = Utc::now();

    let start = if app.cursor >= height {
        app.cursor - height + 1
    } else {
        0
    };
    let end = (start + height).min(app.workers.len());

    let mut lines = Vec::with_capacity(end - start);
    for (i, worker) in app.workers.iter().enumerate().take(end).skip(start) {
        let mut spans = Vec::new();
        if i == app.cursor {
            spans.push(Span::styled("▸ ", theme::cursor()));
        } else {
            spans.push(Span::raw("  "));
        }

        let name = pad_right(&truncate(&worker.name, COL_NAME - 2), COL_NAME - 2);
        spans.push(Span::raw(name));

        let label = pad_right(&theme::status_label(&worker.status), COL_STATUS);
        spans.push(Span::styled(label, theme::status(&worker.status)));

        spans.push(Span::raw(pad_right(&worker.format_uptime(now), COL_UPTIME)));

        if show_activity {
            spans.push(Span::styled(
                theme::activity_text(&worker.status).to_string(),
                theme::muted(),
            ));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_notification_bar(app: &App, width: usize) -> Paragraph<'static> {
    // Transient errors take priority over transition notices.
    let content = if let Some(err) = &app.last_err {
        truncate(err, width.saturating_sub(4))
    } else {
        app.ring.render(width.saturating_sub(4), Utc::now())
    };
    if content.is_empty() {
        return Paragraph::new("");
    }
    Paragraph::new(Line::styled(
        format!("  {content}"),
        theme::notification_bar(),
    ))
}

fn render_help() -> Paragraph<'static> {
    Paragraph::new(Line::styled(
        "  j/k:navigate  Enter:connect  r:refresh  q:quit",
        theme::muted(),
    ))
}

fn pad_right(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.chars().take(width).collect()
    } else {
        let mut out = s.to_string();
        out.extend(std::iter::repeat(' ').take(width - len));
        out
    }
}

fn truncate(s: &str, max: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max {
        return s.to_string();
    }
    if max <= 1 {
        return chars.into_iter().take(max).collect();
    }
    let mut out: String = chars[..max - 1].iter().collect();
    out.push('…');
    out
}
