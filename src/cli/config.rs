use std::path::PathBuf;

use clap::Parser;

use crate::chat::{self, GenerationParams};
use crate::cli::error::CliError;

/// Command-line interface configuration for the chat application
#[derive(Debug, Parser)]
#[command(name = "smolchat")]
#[command(about = "Streaming chat TUI for local GGUF models", long_about = None)]
pub struct CliConfig {
    /// Path to the GGUF model file
    #[arg(value_name = "GGUF_PATH")]
    pub gguf_path: PathBuf,

    /// Optional prompts to submit in order once the model is ready
    #[arg(value_name = "PROMPT")]
    pub prompts: Vec<String>,

    /// Path to the tokenizer.json (default: next to the model file)
    #[arg(long, value_name = "PATH")]
    pub tokenizer: Option<PathBuf>,

    /// Generation configuration options
    #[command(flatten)]
    pub generation: GenerationConfig,

    /// Number of past turns kept as model context (rounded down to a full
    /// user/assistant pair)
    #[arg(long, default_value_t = chat::history::DEFAULT_WINDOW)]
    pub history_window: usize,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format (tui, text)
    #[arg(long, value_enum, default_value_t = OutputFormat::Tui)]
    pub output_format: OutputFormat,
}

/// Generation configuration options
#[derive(Debug, Parser)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate per reply
    #[arg(long, default_value_t = 1024)]
    pub max_tokens: usize,

    /// Temperature for sampling (0.0-2.0)
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    /// Top-p sampling parameter (0.0-1.0)
    #[arg(long, default_value_t = 0.95)]
    pub top_p: f64,

    /// Decode greedily, ignoring temperature and top-p
    #[arg(long)]
    pub greedy: bool,

    /// Random seed for sampling (optional)
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Interactive terminal UI (default)
    Tui,
    /// Plain text on stdout, one reply per prompt
    Text,
}

impl CliConfig {
    /// Validate settings that clap cannot express.
    pub fn validate(&self) -> Result<(), CliError> {
        if !self.gguf_path.is_file() {
            return Err(CliError::file_path_error(format!(
                "model file not found: {}",
                self.gguf_path.display()
            )));
        }
        let tokenizer = self.tokenizer_path();
        if !tokenizer.is_file() {
            return Err(CliError::file_path_error(format!(
                "tokenizer file not found: {}",
                tokenizer.display()
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(CliError::config_error("max-tokens must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(CliError::config_error("temperature must be in 0.0-2.0"));
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(CliError::config_error("top-p must be in 0.0-1.0"));
        }
        if self.output_format == OutputFormat::Text && self.prompts.is_empty() {
            return Err(CliError::config_error(
                "text output requires at least one prompt",
            ));
        }
        Ok(())
    }

    /// Tokenizer path, defaulting to `tokenizer.json` next to the model.
    pub fn tokenizer_path(&self) -> PathBuf {
        match &self.tokenizer {
            Some(path) => path.clone(),
            None => self
                .gguf_path
                .parent()
                .map(|dir| dir.join("tokenizer.json"))
                .unwrap_or_else(|| PathBuf::from("tokenizer.json")),
        }
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            sample: !self.generation.greedy,
            seed: self.generation.seed,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.95,
            greedy: false,
            seed: None,
        }
    }
}
