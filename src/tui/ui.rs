use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::app_event::AlertLevel;
use crate::tui::app::{App, EntryKind, FocusArea};

pub fn render(app: &mut App, frame: &mut Frame) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3), Constraint::Length(1)])
        .split(frame.area());

    let transcript_lines = transcript_lines(app);
    let transcript_block = Block::default()
        .title("Conversation (Tab to switch focus, q to quit)")
        .borders(Borders::ALL)
        .border_style(border_style(app.focus == FocusArea::Transcript));
    let transcript = Paragraph::new(transcript_lines.clone())
        .block(transcript_block)
        .wrap(Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    let input_block = Block::default()
        .title("Message (Enter to send, Esc to stop, Ctrl+R to reset)")
        .borders(Borders::ALL)
        .border_style(border_style(app.focus == FocusArea::Input));
    let input = Paragraph::new(app.input_buffer.clone())
        .block(input_block)
        .wrap(Wrap { trim: false });

    let status_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(main_layout[2]);

    let status_text =
        Paragraph::new(app.status.clone()).style(Style::default().fg(Color::White).bg(Color::Blue));
    let queue_text = Paragraph::new(queue_display(app))
        .style(Style::default().fg(Color::White).bg(Color::Blue))
        .alignment(Alignment::Right);

    frame.render_widget(transcript, main_layout[0]);
    frame.render_widget(input, main_layout[1]);
    frame.render_widget(status_text, status_layout[0]);
    frame.render_widget(queue_text, status_layout[1]);

    app.transcript_area = main_layout[0];
    app.input_area = main_layout[1];

    if let Some(alert) = app.active_alert() {
        let pending = app.pending_alert_count();
        render_alert_modal(frame, alert, pending);
    }

    if app.request_follow {
        if app.transcript_area.height > 2 {
            let visible = (app.transcript_area.height - 2) as usize;
            let baseline = transcript_lines.len().saturating_sub(visible) as u16;
            app.transcript_scroll = baseline;
        }
        app.request_follow = false;
    }
}

fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for entry in &app.entries {
        push_entry_lines(&mut lines, entry.kind, &entry.text);
        lines.push(Line::default());
    }
    if let Some(streaming) = &app.streaming {
        push_entry_lines(&mut lines, EntryKind::Assistant, streaming);
        if app.is_generating {
            lines.push(Line::from(Span::styled(
                "...",
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    lines
}

fn push_entry_lines(lines: &mut Vec<Line<'static>>, kind: EntryKind, text: &str) {
    let (prefix, style) = match kind {
        EntryKind::User => ("> ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        EntryKind::Assistant => ("", Style::default()),
        EntryKind::Stopped => ("", Style::default().fg(Color::DarkGray)),
        EntryKind::Error => ("! ", Style::default().fg(Color::Red)),
        EntryKind::System => ("* ", Style::default().fg(Color::Yellow)),
    };
    for (index, line) in text.lines().enumerate() {
        let rendered = if index == 0 {
            format!("{prefix}{line}")
        } else {
            line.to_string()
        };
        lines.push(Line::from(Span::styled(rendered, style)));
    }
    if text.is_empty() {
        lines.push(Line::from(Span::styled(prefix.to_string(), style)));
    }
    if kind == EntryKind::Stopped {
        lines.push(Line::from(Span::styled(
            "[stopped]",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }
}

fn queue_display(app: &App) -> String {
    if app.queued_prompts.is_empty() {
        String::new()
    } else {
        format!("{} prompt(s) queued", app.queued_prompts.len())
    }
}

fn border_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn render_alert_modal(frame: &mut Frame, alert: &crate::app_event::Alert, pending: usize) {
    use chrono::SecondsFormat;

    let area = centered_rect(60, 40, frame.area());
    frame.render_widget(Clear, area);

    let timestamp = alert.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut message = format!("{}\n\nTime: {}", alert.message, timestamp);
    if pending > 0 {
        message.push_str(&format!("\n\n{} more alert(s) pending", pending));
    }
    message.push_str("\n\nPress Enter, Space, or Esc to dismiss.");

    let block = Block::default()
        .title(alert.level.as_str().to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(alert_color(&alert.level)));

    let paragraph = Paragraph::new(message)
        .block(block)
        .wrap(Wrap { trim: false })
        .alignment(Alignment::Left)
        .style(Style::default().fg(Color::White).bg(Color::Black));

    frame.render_widget(paragraph, area);
}

fn alert_color(level: &AlertLevel) -> Color {
    match level {
        AlertLevel::Info => Color::LightBlue,
        AlertLevel::Warning => Color::Yellow,
        AlertLevel::Error => Color::Red,
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let remaining_y = 100u16.saturating_sub(percent_y);
    let top_margin = remaining_y / 2;
    let bottom_margin = remaining_y.saturating_sub(top_margin);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(top_margin),
            Constraint::Percentage(percent_y.min(100)),
            Constraint::Percentage(bottom_margin),
        ])
        .split(area);

    let remaining_x = 100u16.saturating_sub(percent_x);
    let left_margin = remaining_x / 2;
    let right_margin = remaining_x.saturating_sub(left_margin);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(left_margin),
            Constraint::Percentage(percent_x.min(100)),
            Constraint::Percentage(right_margin),
        ])
        .split(vertical[1])[1]
}
