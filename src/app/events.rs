use std::any::Any;

use crate::app_event::AppEvent;
use crate::tui::App;
use crate::tui::app::EntryKind;

pub(crate) fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn handle_app_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Progress { percent, message } => {
            app.status = format!("{message} ({percent}%)");
        }
        AppEvent::Ready => {
            app.is_ready = true;
            app.status = "Waiting for input...".to_string();
        }
        AppEvent::Token { text } => {
            app.append_fragment(&text);
        }
        AppEvent::Complete => {
            app.finalize_stream(EntryKind::Assistant);
        }
        AppEvent::Stopped => {
            // The partial reply stays visible but is marked as stopped; it was
            // never committed to the conversation the model sees.
            app.finalize_stream(EntryKind::Stopped);
        }
        AppEvent::Error { message } => {
            // Partial text stays on screen, but as an error-kind entry so it
            // can never be mistaken for a committed reply.
            if app.streaming.as_deref().is_some_and(|text| !text.is_empty()) {
                app.finalize_stream(EntryKind::Error);
            } else {
                app.discard_stream();
            }
            app.push_entry(EntryKind::Error, message);
        }
        AppEvent::ResetComplete => {
            app.entries.clear();
            app.streaming = None;
            app.is_generating = false;
            app.transcript_scroll = 0;
            app.follow_bottom = true;
            app.push_entry(EntryKind::System, "Conversation reset.");
        }
        AppEvent::Status(status) => {
            app.status = status;
        }
        AppEvent::Alert(alert) => {
            app.push_alert(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn app() -> App {
        App::new(Vec::new())
    }

    #[test]
    fn ready_unlocks_the_session() {
        let mut app = app();
        handle_app_event(&mut app, AppEvent::Progress { percent: 40, message: "Loading model weights...".to_string() });
        assert!(app.status.contains("40%"));
        handle_app_event(&mut app, AppEvent::Ready);
        assert!(app.is_ready);
    }

    #[test]
    fn tokens_then_complete_commit_the_reply() {
        let mut app = app();
        app.is_ready = true;
        app.submit("hi".to_string());
        handle_app_event(&mut app, AppEvent::Token { text: Arc::from("Hel") });
        handle_app_event(&mut app, AppEvent::Token { text: Arc::from("lo") });
        handle_app_event(&mut app, AppEvent::Complete);
        assert_eq!(app.entries.last().map(|entry| entry.text.as_str()), Some("Hello"));
        assert!(!app.is_generating);
    }

    #[test]
    fn error_keeps_partial_text_visible_but_not_as_reply() {
        let mut app = app();
        app.is_ready = true;
        app.submit("hi".to_string());
        handle_app_event(&mut app, AppEvent::Token { text: Arc::from("partial reply") });
        handle_app_event(
            &mut app,
            AppEvent::Error { message: "backend exploded".to_string() },
        );
        // The streamed text survives in the transcript, marked as an error.
        assert!(
            app.entries
                .iter()
                .any(|entry| entry.kind == EntryKind::Error && entry.text == "partial reply")
        );
        // But never as an assistant entry.
        assert!(
            !app.entries
                .iter()
                .any(|entry| entry.kind == EntryKind::Assistant && entry.text == "partial reply")
        );
        let last = app.entries.last().expect("error entry");
        assert_eq!(last.kind, EntryKind::Error);
        assert_eq!(last.text, "backend exploded");
        assert!(app.streaming.is_none());
        assert!(!app.is_generating);
    }

    #[test]
    fn error_without_streamed_text_adds_only_the_message() {
        let mut app = app();
        app.is_ready = true;
        app.submit("hi".to_string());
        handle_app_event(
            &mut app,
            AppEvent::Error { message: "backend exploded".to_string() },
        );
        let errors: Vec<_> = app
            .entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Error)
            .collect();
        assert_eq!(errors.len(), 1, "no empty placeholder entry");
        assert_eq!(errors[0].text, "backend exploded");
        assert!(!app.is_generating);
    }

    #[test]
    fn stopped_keeps_the_partial_reply_marked() {
        let mut app = app();
        app.is_ready = true;
        app.submit("hi".to_string());
        handle_app_event(&mut app, AppEvent::Token { text: Arc::from("par") });
        handle_app_event(&mut app, AppEvent::Stopped);
        let last = app.entries.last().expect("stopped entry");
        assert_eq!(last.kind, EntryKind::Stopped);
        assert_eq!(last.text, "par");
    }

    #[test]
    fn reset_clears_the_transcript() {
        let mut app = app();
        app.is_ready = true;
        app.submit("hi".to_string());
        handle_app_event(&mut app, AppEvent::Complete);
        handle_app_event(&mut app, AppEvent::ResetComplete);
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].kind, EntryKind::System);
    }
}
