use std::collections::VecDeque;

use crate::app_event::{Alert, ChatCommand};

/// Result type used throughout the TUI application
pub type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// One finished transcript entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub kind: EntryKind,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    /// Partial reply kept on screen after a stop; never part of the
    /// conversation the model sees.
    Stopped,
    Error,
    System,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FocusArea {
    Transcript,
    Input,
}

/// Main application state
pub struct App {
    pub entries: Vec<ChatEntry>,
    /// Reply currently being streamed, if any.
    pub streaming: Option<String>,
    pub input_buffer: String,
    /// Prompts supplied on the command line, submitted one at a time as the
    /// session becomes idle.
    pub queued_prompts: VecDeque<String>,
    pub is_ready: bool,
    pub is_generating: bool,
    pub should_quit: bool,
    pub status: String,
    pub focus: FocusArea,
    pub transcript_scroll: u16,
    pub follow_bottom: bool,
    pub request_follow: bool,
    pub transcript_area: ratatui::layout::Rect,
    pub input_area: ratatui::layout::Rect,
    pub alert_queue: VecDeque<Alert>,
    pub active_alert: Option<Alert>,
}

impl App {
    pub fn new(queued_prompts: Vec<String>) -> Self {
        Self {
            entries: Vec::new(),
            streaming: None,
            input_buffer: String::new(),
            queued_prompts: queued_prompts.into(),
            is_ready: false,
            is_generating: false,
            should_quit: false,
            status: "Initializing...".to_string(),
            focus: FocusArea::Input,
            transcript_scroll: 0,
            follow_bottom: true,
            request_follow: false,
            transcript_area: ratatui::layout::Rect::new(0, 0, 0, 0),
            input_area: ratatui::layout::Rect::new(0, 0, 0, 0),
            alert_queue: VecDeque::new(),
            active_alert: None,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Submit a user message: echo it to the transcript and hand back the
    /// command to send. While a reply is streaming the message is refused
    /// with a warning alert instead.
    pub fn submit(&mut self, text: String) -> Option<ChatCommand> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        if self.is_generating {
            self.push_alert(Alert::warning(
                "Still generating; wait for completion before sending the next message.",
            ));
            return None;
        }
        self.entries.push(ChatEntry {
            kind: EntryKind::User,
            text: text.clone(),
        });
        self.is_generating = true;
        self.streaming = Some(String::new());
        self.scroll_to_end();
        Some(ChatCommand::Generate { message: text })
    }

    /// Submit the typed input buffer, if any.
    pub fn submit_input(&mut self) -> Option<ChatCommand> {
        let text = std::mem::take(&mut self.input_buffer);
        self.submit(text)
    }

    /// Take the next queued command-line prompt when the session is idle.
    pub fn submit_queued_prompt(&mut self) -> Option<ChatCommand> {
        if !self.is_ready || self.is_generating {
            return None;
        }
        let prompt = self.queued_prompts.pop_front()?;
        self.submit(prompt)
    }

    /// Ask for the in-flight generation to stop.
    pub fn request_stop(&self) -> Option<ChatCommand> {
        if self.is_generating { Some(ChatCommand::Stop) } else { None }
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        let was_following = self.follow_bottom;
        self.streaming
            .get_or_insert_with(String::new)
            .push_str(fragment);
        if was_following {
            self.request_follow = true;
        }
    }

    /// Move the streaming buffer (if any) into the transcript as `kind`.
    pub fn finalize_stream(&mut self, kind: EntryKind) {
        let text = self.streaming.take().unwrap_or_default();
        if !text.is_empty() || kind != EntryKind::Assistant {
            self.entries.push(ChatEntry { kind, text });
        }
        self.is_generating = false;
        if self.follow_bottom {
            self.request_follow = true;
        }
    }

    /// Drop the streaming buffer without committing it to the transcript.
    pub fn discard_stream(&mut self) {
        self.streaming = None;
        self.is_generating = false;
    }

    pub fn push_entry(&mut self, kind: EntryKind, text: impl Into<String>) {
        self.entries.push(ChatEntry {
            kind,
            text: text.into(),
        });
        if self.follow_bottom {
            self.request_follow = true;
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = match self.focus {
            FocusArea::Transcript => FocusArea::Input,
            FocusArea::Input => FocusArea::Transcript,
        };
    }

    pub fn scroll(&mut self, delta: i32) {
        if delta != 0 {
            self.follow_bottom = false;
        }
        let current = i32::from(self.transcript_scroll);
        let next = (current + delta).clamp(0, u16::MAX as i32);
        self.transcript_scroll = next as u16;
        if self.transcript_scroll == 0 && delta <= 0 {
            self.follow_bottom = true;
        }
    }

    pub fn scroll_to_end(&mut self) {
        self.follow_bottom = true;
        self.request_follow = true;
    }

    pub fn push_alert(&mut self, alert: Alert) {
        if self.active_alert.is_some() {
            self.alert_queue.push_back(alert);
        } else {
            self.active_alert = Some(alert);
        }
    }

    pub fn active_alert(&self) -> Option<&Alert> {
        self.active_alert.as_ref()
    }

    pub fn has_active_alert(&self) -> bool {
        self.active_alert.is_some()
    }

    pub fn dismiss_active_alert(&mut self) {
        if let Some(next) = self.alert_queue.pop_front() {
            self.active_alert = Some(next);
        } else {
            self.active_alert = None;
        }
    }

    pub fn pending_alert_count(&self) -> usize {
        self.alert_queue.len()
    }
}
