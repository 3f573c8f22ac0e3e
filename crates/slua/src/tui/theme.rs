use ratatui::style::{Color, Modifier, Style};
use slua_core::WorkerStatus;

pub fn header() -> Style {
    Style::default()
        .fg(Color::LightBlue)
        .add_modifier(Modifier::BOLD)
}

pub fn muted() -> Style {
    Style::default().fg(Color::DarkGray)
}

pub fn cursor() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

pub fn column_header() -> Style {
    Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::UNDERLINED)
}

pub fn notification_bar() -> Style {
    Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::ITALIC)
}

pub fn badge() -> Style {
    Style::default()
        .fg(Color::Red)
        .add_modifier(Modifier::BOLD)
}

pub fn status(status: &WorkerStatus) -> Style {
    match status {
        WorkerStatus::Working => Style::default().fg(Color::Yellow),
        WorkerStatus::Finished => Style::default().fg(Color::Green),
        WorkerStatus::Waiting | WorkerStatus::Error => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD),
        WorkerStatus::Sleeping | WorkerStatus::Unreachable => {
            Style::default().fg(Color::DarkGray)
        }
        _ => muted(),
    }
}

/// Display text for a status, including attention indicators.
pub fn status_label(status: &WorkerStatus) -> String {
    match status {
        WorkerStatus::Error => "ERROR !".to_string(),
        WorkerStatus::Unreachable => "UNREACHABLE ?".to_string(),
        other => other.as_str().to_string(),
    }
}

/// Short activity description for the wide-terminal column.
pub fn activity_text(status: &WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Working => "active",
        WorkerStatus::Finished => "completed",
        WorkerStatus::Waiting => "needs input",
        WorkerStatus::Error => "failed",
        WorkerStatus::Sleeping => "idle",
        WorkerStatus::Unreachable => "connection lost",
        _ => "",
    }
}
