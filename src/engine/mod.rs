//! The generation engine seam.
//!
//! Everything heavy (weights, tokenization, tensor math, device selection)
//! lives behind [`GenerationEngine`]; the session only sees role-tagged turns
//! in and streamed text fragments out.

pub mod candle;

pub use candle::CandleEngine;

use thiserror::Error;

use crate::chat::{GenerationParams, Turn};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller's fragment callback requested an abort.
    #[error("generation aborted by caller")]
    Aborted,

    #[error("engine initialization failed: {0}")]
    Init(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

/// One initialization progress report.
#[derive(Clone, Debug)]
pub struct InitProgress {
    pub percent: u8,
    pub message: String,
}

impl InitProgress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

pub trait GenerationEngine {
    /// Load whatever the engine needs to serve `generate` calls.
    ///
    /// `progress` is invoked at coarse step boundaries; returning `false`
    /// asks the engine to abandon initialization (it then returns an error).
    fn initialize(
        &mut self,
        progress: &mut dyn FnMut(InitProgress) -> bool,
    ) -> Result<(), EngineError>;

    /// Produce a reply to `turns`, invoking `on_fragment` for each streamed
    /// piece of text in production order. Returning `false` from the callback
    /// requests a cooperative abort; the engine then stops at its next step
    /// boundary and returns [`EngineError::Aborted`].
    fn generate(
        &mut self,
        turns: &[Turn],
        params: &GenerationParams,
        on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<String, EngineError>;
}
