//! Conversation state: turns, history bookkeeping and the inference session.

pub mod history;
pub mod session;

pub use history::History;
pub use session::{CancelFlag, GenerateOutcome, InferenceSession, SessionState};

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message in a conversation. Immutable once committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling configuration passed to the engine on every call.
///
/// Fixed for the lifetime of a session; sourced from CLI flags.
#[derive(Clone, Debug)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate per reply.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// When false, decode greedily and ignore temperature/top_p.
    pub sample: bool,
    /// Optional RNG seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.95,
            sample: true,
            seed: None,
        }
    }
}
