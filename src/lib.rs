//! Streaming chat client for small GGUF language models.
//!
//! The UI thread and the generation worker communicate exclusively through
//! typed messages: [`app_event::ChatCommand`] in one direction and
//! [`app_event::AppEvent`] in the other. The worker owns the
//! [`chat::InferenceSession`], which keeps the conversation history valid
//! (user-first, strictly alternating, bounded window) and guarantees exactly
//! one terminal event per generation request.

pub mod app;
pub mod app_event;
pub mod chat;
pub mod cli;
pub mod engine;
pub mod tui;
