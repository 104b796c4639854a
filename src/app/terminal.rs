use std::io::stdout;

use anyhow::Result;
use crossterm::event::{self, MouseButton, MouseEvent};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};

use crate::tui::{App, app::FocusArea};

pub(super) fn setup_terminal() -> Result<Terminal<impl Backend>> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(
        stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    terminal.clear()?;
    Ok(terminal)
}

pub(super) fn restore_terminal() -> Result<()> {
    crossterm::execute!(
        stdout(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture
    )?;
    crossterm::terminal::disable_raw_mode()?;
    Ok(())
}

pub(super) fn handle_mouse_event(event: MouseEvent, app: &mut App) {
    let position = (event.column, event.row).into();

    match event.kind {
        event::MouseEventKind::Down(MouseButton::Left) => {
            if app.transcript_area.contains(position) {
                app.focus = FocusArea::Transcript;
            } else if app.input_area.contains(position) {
                app.focus = FocusArea::Input;
            }
        }
        event::MouseEventKind::ScrollUp => {
            app.scroll(-1);
        }
        event::MouseEventKind::ScrollDown => {
            app.scroll(1);
        }
        _ => {}
    }
}
