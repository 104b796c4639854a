use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Requests sent from the UI thread to the session worker.
#[derive(Clone, Debug)]
pub enum ChatCommand {
    /// Start (or re-confirm) session initialization.
    Init,
    /// Request a reply to `message`.
    Generate { message: String },
    /// Request cancellation of the in-flight generation.
    Stop,
    /// Clear the conversation history.
    Reset,
}

/// Events streamed from the session worker back to the UI thread.
///
/// For any single `Generate` request, `Token` events arrive in production
/// order and exactly one of `Complete`/`Error`/`Stopped` follows them.
#[derive(Clone, Debug)]
pub enum AppEvent {
    /// Initialization progress (0-100).
    Progress { percent: u8, message: String },
    /// Session is initialized and can accept `Generate` requests.
    Ready,
    /// One streamed fragment of the in-flight reply.
    Token { text: Arc<str> },
    /// Generation finished and was committed to history.
    Complete,
    /// Terminal failure for the current request; history is unchanged.
    Error { message: String },
    /// Generation was cancelled by the user; history is unchanged.
    Stopped,
    /// History was cleared.
    ResetComplete,
    /// Free-form worker status line.
    Status(String),
    Alert(Alert),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, message)
    }
}
