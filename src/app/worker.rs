//! Session worker: owns the inference session on a dedicated thread.
//!
//! All cross-thread traffic is typed messages: `ChatCommand` in, `AppEvent`
//! out. While a generation is in flight the command channel is drained at
//! every fragment boundary, which is where stop requests, busy rejections
//! and deferred resets are observed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;

use crate::app_event::{Alert, AppEvent, ChatCommand};
use crate::chat::{GenerationParams, InferenceSession};
use crate::engine::GenerationEngine;

use super::events::panic_payload_message;

pub struct SessionWorkerParams {
    pub tx: mpsc::Sender<AppEvent>,
    pub cmd_rx: mpsc::Receiver<ChatCommand>,
    pub generation: GenerationParams,
    pub history_window: usize,
}

pub fn spawn_session_worker<E>(engine: E, params: SessionWorkerParams) -> thread::JoinHandle<Result<()>>
where
    E: GenerationEngine + Send + 'static,
{
    let SessionWorkerParams {
        tx,
        cmd_rx,
        generation,
        history_window,
    } = params;

    let worker_tx = tx.clone();
    thread::spawn(move || -> Result<()> {
        let worker = || -> Result<()> {
            let mut session = InferenceSession::new(engine, generation, history_window);

            loop {
                let command = match cmd_rx.recv() {
                    Ok(command) => command,
                    // UI side went away; nothing left to serve.
                    Err(_) => break,
                };

                match command {
                    ChatCommand::Init => {
                        session.initialize(&worker_tx);
                    }
                    ChatCommand::Generate { message } => {
                        worker_tx.send(AppEvent::Status("Generating...".to_string()))?;

                        let mut reset_deferred = false;
                        let outcome = session.generate(&message, &worker_tx, &mut |cancel| {
                            while let Ok(command) = cmd_rx.try_recv() {
                                match command {
                                    ChatCommand::Stop => cancel.set(),
                                    // Rejected with an alert, not an `Error`:
                                    // `Error` is a terminal event and would be
                                    // read as ending the in-flight call.
                                    ChatCommand::Generate { .. } => {
                                        let _ = worker_tx.send(AppEvent::Alert(Alert::warning(
                                            "a generation is already in flight; message dropped",
                                        )));
                                    }
                                    // Serialized behind the in-flight call so
                                    // it can never race the commit.
                                    ChatCommand::Reset => reset_deferred = true,
                                    ChatCommand::Init => {}
                                }
                            }
                        });
                        tracing::debug!(?outcome, history_len = session.history().len(), "generation finished");

                        if reset_deferred {
                            session.reset(&worker_tx);
                        }
                        worker_tx.send(AppEvent::Status("Waiting for input...".to_string()))?;
                    }
                    ChatCommand::Stop => {
                        // No generation in flight (in-flight stops are drained
                        // by the poll above); nothing to do.
                        session.stop();
                    }
                    ChatCommand::Reset => {
                        session.reset(&worker_tx);
                    }
                }
            }
            Ok(())
        };

        match panic::catch_unwind(AssertUnwindSafe(worker)) {
            Ok(result) => {
                if let Err(err) = &result {
                    let _ = worker_tx.send(AppEvent::Alert(Alert::error(format!(
                        "Session worker failed: {err:#}"
                    ))));
                }
                result
            }
            Err(payload) => {
                let message = format!("Session worker panicked: {}", panic_payload_message(payload));
                let _ = worker_tx.send(AppEvent::Alert(Alert::error(message.clone())));
                Err(anyhow::anyhow!(message))
            }
        }
    })
}
