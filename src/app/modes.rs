use std::{
    io::Write,
    sync::mpsc,
    thread,
    time::Duration,
};

use anyhow::Result;
use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyModifiers};

use super::{
    events::handle_app_event,
    terminal::{handle_mouse_event, restore_terminal, setup_terminal},
};
use crate::{
    app_event::{AlertLevel, AppEvent, ChatCommand},
    tui::{self, App, AppResult, app::FocusArea},
};

pub fn run_tui_mode(
    rx: mpsc::Receiver<AppEvent>,
    cmd_tx: mpsc::Sender<ChatCommand>,
    queued_prompts: Vec<String>,
    worker_handle: thread::JoinHandle<Result<()>>,
) -> AppResult<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(queued_prompts);

    while !app.should_quit {
        if crossterm::event::poll(Duration::from_millis(50))? {
            match crossterm::event::read()? {
                CrosstermEvent::Key(key) => {
                    if app.has_active_alert()
                        && matches!(key.code, KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Esc)
                    {
                        app.dismiss_active_alert();
                        continue;
                    }

                    if key.code == KeyCode::Char('r') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        let _ = cmd_tx.send(ChatCommand::Reset);
                        continue;
                    }

                    let handled = if app.focus == FocusArea::Input {
                        match key.code {
                            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                                app.input_buffer.push(c);
                                true
                            }
                            KeyCode::Backspace => {
                                app.input_buffer.pop();
                                true
                            }
                            KeyCode::Enter => {
                                if let Some(command) = app.submit_input() {
                                    let _ = cmd_tx.send(command);
                                }
                                true
                            }
                            _ => false,
                        }
                    } else {
                        false
                    };

                    if !handled {
                        match key.code {
                            KeyCode::Esc => {
                                if let Some(command) = app.request_stop() {
                                    let _ = cmd_tx.send(command);
                                } else if app.focus == FocusArea::Input {
                                    app.focus = FocusArea::Transcript;
                                }
                            }
                            KeyCode::Char('q') => app.quit(),
                            KeyCode::Tab => app.focus_next(),
                            KeyCode::Up => app.scroll(-1),
                            KeyCode::Down => app.scroll(1),
                            KeyCode::PageUp => app.scroll(-10),
                            KeyCode::PageDown => app.scroll(10),
                            KeyCode::End => app.scroll_to_end(),
                            _ => {}
                        }
                    }
                }
                CrosstermEvent::Mouse(mouse_event) => {
                    handle_mouse_event(mouse_event, &mut app);
                }
                _ => {}
            }
        }

        while let Ok(event) = rx.try_recv() {
            handle_app_event(&mut app, event);
        }

        if let Some(command) = app.submit_queued_prompt() {
            let _ = cmd_tx.send(command);
        }

        terminal.draw(|frame| tui::ui::render(&mut app, frame))?;
    }

    restore_terminal()?;
    drop(cmd_tx);
    worker_handle.join().unwrap()?;
    Ok(())
}

pub fn run_text_mode(
    prompts: &[String],
    rx: mpsc::Receiver<AppEvent>,
    cmd_tx: mpsc::Sender<ChatCommand>,
    worker_handle: thread::JoinHandle<Result<()>>,
) -> AppResult<()> {
    // Block until the model is loaded; initialization progress goes to the
    // log rather than stdout.
    loop {
        match rx.recv() {
            Ok(AppEvent::Ready) => break,
            Ok(AppEvent::Progress { percent, message }) => {
                tracing::debug!(percent, "{message}");
            }
            Ok(AppEvent::Error { message }) => {
                drop(cmd_tx);
                let _ = worker_handle.join();
                return Err(anyhow::anyhow!("initialization failed: {message}").into());
            }
            Ok(event) => log_background_event(event),
            Err(_) => {
                worker_handle.join().unwrap()?;
                return Err(anyhow::anyhow!("worker exited before becoming ready").into());
            }
        }
    }

    for (index, prompt) in prompts.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("> {prompt}\n");
        cmd_tx.send(ChatCommand::Generate {
            message: prompt.clone(),
        })?;

        loop {
            match rx.recv() {
                Ok(AppEvent::Token { text }) => {
                    print!("{text}");
                    if text.contains('\n') {
                        std::io::stdout().flush()?;
                    }
                }
                Ok(AppEvent::Complete) => {
                    // Ensure output ends with a newline so shells don't render
                    // a trailing `%`.
                    println!();
                    std::io::stdout().flush()?;
                    break;
                }
                Ok(AppEvent::Stopped) => {
                    println!("\n[stopped]");
                    break;
                }
                Ok(AppEvent::Error { message }) => {
                    tracing::error!("{message}");
                    eprintln!("error: {message}");
                    break;
                }
                Ok(event) => log_background_event(event),
                Err(_) => {
                    worker_handle.join().unwrap()?;
                    return Err(anyhow::anyhow!("worker exited mid-generation").into());
                }
            }
        }
    }

    drop(cmd_tx);
    while let Ok(event) = rx.recv() {
        log_background_event(event);
    }
    worker_handle.join().unwrap()?;
    Ok(())
}

fn log_background_event(event: AppEvent) {
    match event {
        AppEvent::Status(status) => tracing::debug!("{status}"),
        AppEvent::Alert(alert) => match alert.level {
            AlertLevel::Info => tracing::info!("{}", alert.message),
            AlertLevel::Warning => tracing::warn!("{}", alert.message),
            AlertLevel::Error => tracing::error!("{}", alert.message),
        },
        AppEvent::ResetComplete => tracing::debug!("conversation reset"),
        other => tracing::trace!(?other, "ignored event"),
    }
}
