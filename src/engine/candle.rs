//! Candle-backed engine for quantized GGUF models.
//!
//! All numerics are candle's; this adapter only formats the chat prompt,
//! feeds tokens through the model, and decodes the sampled ids back into
//! incremental text fragments.

use std::fs::File;
use std::path::PathBuf;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use super::{EngineError, GenerationEngine, InitProgress};
use crate::chat::{GenerationParams, Role, Turn};

const EOS_CANDIDATES: &[&str] = &["<|im_end|>", "<|endoftext|>", "</s>"];

pub struct CandleEngine {
    gguf_path: PathBuf,
    tokenizer_path: PathBuf,
    device: Device,
    loaded: Option<Loaded>,
}

struct Loaded {
    model: ModelWeights,
    tokenizer: Tokenizer,
    eos_token: u32,
}

impl CandleEngine {
    pub fn new(gguf_path: impl Into<PathBuf>, tokenizer_path: impl Into<PathBuf>) -> Self {
        Self {
            gguf_path: gguf_path.into(),
            tokenizer_path: tokenizer_path.into(),
            device: Device::Cpu,
            loaded: None,
        }
    }
}

impl GenerationEngine for CandleEngine {
    fn initialize(
        &mut self,
        progress: &mut dyn FnMut(InitProgress) -> bool,
    ) -> Result<(), EngineError> {
        if self.loaded.is_some() {
            return Ok(());
        }

        if !progress(InitProgress::new(5, "Reading GGUF metadata...")) {
            return Err(EngineError::Init("initialization aborted".into()));
        }
        let mut file = File::open(&self.gguf_path)
            .map_err(|err| EngineError::Init(format!("{}: {err}", self.gguf_path.display())))?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|err| EngineError::Init(err.to_string()))?;
        tracing::info!(
            tensors = content.tensor_infos.len(),
            path = %self.gguf_path.display(),
            "loaded GGUF metadata"
        );

        if !progress(InitProgress::new(25, "Loading model weights...")) {
            return Err(EngineError::Init("initialization aborted".into()));
        }
        let model = ModelWeights::from_gguf(content, &mut file, &self.device)
            .map_err(|err| EngineError::Init(err.to_string()))?;

        if !progress(InitProgress::new(85, "Loading tokenizer...")) {
            return Err(EngineError::Init("initialization aborted".into()));
        }
        let tokenizer = Tokenizer::from_file(&self.tokenizer_path)
            .map_err(|err| EngineError::Init(format!("{}: {err}", self.tokenizer_path.display())))?;
        let eos_token = EOS_CANDIDATES
            .iter()
            .find_map(|token| tokenizer.token_to_id(token))
            .ok_or_else(|| EngineError::Init("tokenizer has no recognized EOS token".into()))?;

        if !progress(InitProgress::new(100, "Model ready")) {
            return Err(EngineError::Init("initialization aborted".into()));
        }
        self.loaded = Some(Loaded {
            model,
            tokenizer,
            eos_token,
        });
        Ok(())
    }

    fn generate(
        &mut self,
        turns: &[Turn],
        params: &GenerationParams,
        on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<String, EngineError> {
        let loaded = self
            .loaded
            .as_mut()
            .ok_or_else(|| EngineError::Generation("engine is not initialized".into()))?;

        let prompt = render_prompt(turns);
        let prompt_tokens = loaded
            .tokenizer
            .encode(prompt.as_str(), true)
            .map_err(|err| EngineError::Generation(err.to_string()))?
            .get_ids()
            .to_vec();
        tracing::debug!(prompt_tokens = prompt_tokens.len(), "encoded chat prompt");

        let (temperature, top_p) = if params.sample {
            (Some(params.temperature), Some(params.top_p))
        } else {
            (None, None)
        };
        let mut logits_processor =
            LogitsProcessor::new(params.seed.unwrap_or(299792458), temperature, top_p);

        // Prefill: one forward pass over the whole prompt.
        let mut next_token = {
            let input = Tensor::new(prompt_tokens.as_slice(), &self.device)
                .and_then(|tensor| tensor.unsqueeze(0))
                .map_err(|err| EngineError::Generation(err.to_string()))?;
            let logits = loaded
                .model
                .forward(&input, 0)
                .and_then(|logits| logits.squeeze(0))
                .map_err(|err| EngineError::Generation(err.to_string()))?;
            logits_processor
                .sample(&logits)
                .map_err(|err| EngineError::Generation(err.to_string()))?
        };

        let mut decoder = StreamDecoder::default();
        if next_token != loaded.eos_token
            && let Some(fragment) = decoder.push(&loaded.tokenizer, next_token)?
            && !on_fragment(&fragment)
        {
            return Err(EngineError::Aborted);
        }

        // The prefill sample above already spent one token of the budget.
        for index in 0..decode_budget(params.max_tokens) {
            if next_token == loaded.eos_token {
                break;
            }
            let input = Tensor::new(&[next_token], &self.device)
                .and_then(|tensor| tensor.unsqueeze(0))
                .map_err(|err| EngineError::Generation(err.to_string()))?;
            let logits = loaded
                .model
                .forward(&input, prompt_tokens.len() + index)
                .and_then(|logits| logits.squeeze(0))
                .map_err(|err| EngineError::Generation(err.to_string()))?;
            next_token = logits_processor
                .sample(&logits)
                .map_err(|err| EngineError::Generation(err.to_string()))?;

            if next_token == loaded.eos_token {
                break;
            }
            if let Some(fragment) = decoder.push(&loaded.tokenizer, next_token)?
                && !on_fragment(&fragment)
            {
                return Err(EngineError::Aborted);
            }
        }

        let reply = decoder.finish(&loaded.tokenizer)?;
        Ok(reply.trim().to_string())
    }
}

/// Steps left in the decode loop after the prefill sample, so `max_tokens`
/// is an exact cap on sampled tokens.
const fn decode_budget(max_tokens: usize) -> usize {
    max_tokens.saturating_sub(1)
}

/// ChatML-style rendering of the validated turn sequence, ending with an
/// open assistant header for the model to complete.
fn render_prompt(turns: &[Turn]) -> String {
    let mut prompt = String::new();
    for turn in turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        prompt.push_str("<|im_start|>");
        prompt.push_str(role);
        prompt.push('\n');
        prompt.push_str(&turn.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

/// Incremental detokenizer: re-decodes the accumulated ids and emits the
/// newly stable suffix, holding back text that still ends in a partial
/// UTF-8 sequence (the replacement character).
#[derive(Default)]
struct StreamDecoder {
    tokens: Vec<u32>,
    emitted: usize,
}

impl StreamDecoder {
    fn push(&mut self, tokenizer: &Tokenizer, token: u32) -> Result<Option<String>, EngineError> {
        self.tokens.push(token);
        let decoded = tokenizer
            .decode(&self.tokens, true)
            .map_err(|err| EngineError::Generation(err.to_string()))?;
        if decoded.len() > self.emitted && !decoded.ends_with('\u{FFFD}') {
            let fragment = decoded[self.emitted..].to_string();
            self.emitted = decoded.len();
            return Ok(Some(fragment));
        }
        Ok(None)
    }

    fn finish(&self, tokenizer: &Tokenizer) -> Result<String, EngineError> {
        if self.tokens.is_empty() {
            return Ok(String::new());
        }
        tokenizer
            .decode(&self.tokens, true)
            .map_err(|err| EngineError::Generation(err.to_string()))
    }
}
