use std::sync::mpsc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use smolchat::{
    app::{SessionWorkerParams, run_text_mode, run_tui_mode, spawn_session_worker},
    app_event::ChatCommand,
    cli::{CliConfig, config::OutputFormat},
    engine::CandleEngine,
};

fn main() -> Result<()> {
    let config = CliConfig::parse();
    init_tracing(config.verbose);
    config.validate()?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();

    let engine = CandleEngine::new(config.gguf_path.clone(), config.tokenizer_path());
    let worker_handle = spawn_session_worker(
        engine,
        SessionWorkerParams {
            tx,
            cmd_rx,
            generation: config.generation_params(),
            history_window: config.history_window,
        },
    );
    cmd_tx.send(ChatCommand::Init)?;

    let result = match config.output_format {
        OutputFormat::Tui => run_tui_mode(rx, cmd_tx, config.prompts.clone(), worker_handle),
        OutputFormat::Text => run_text_mode(&config.prompts, rx, cmd_tx, worker_handle),
    };
    result.map_err(|err| anyhow::anyhow!("{err}"))
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
