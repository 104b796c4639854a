//! Worker-side session: owns the history, drives the engine, and turns every
//! engine outcome into exactly one terminal event so the UI never hangs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use crate::app_event::AppEvent;
use crate::chat::{GenerationParams, History, Turn};
use crate::engine::{EngineError, GenerationEngine};

/// Ceiling on engine initialization. Checked cooperatively at progress
/// boundaries; exceeding it is reported exactly like an engine failure.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Generating,
    Failed,
}

/// Cooperative cancellation signal, polled at fragment boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a `generate` call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Reply committed to history, `Complete` emitted.
    Completed,
    /// Engine error, history untouched, `Error` emitted.
    Failed,
    /// Cancelled by the user, history untouched, `Stopped` emitted.
    Cancelled,
    /// Rejected before reaching the engine (not ready / already generating).
    Rejected,
}

pub struct InferenceSession<E> {
    engine: E,
    state: SessionState,
    history: History,
    params: GenerationParams,
    cancel: CancelFlag,
}

impl<E: GenerationEngine> InferenceSession<E> {
    pub fn new(engine: E, params: GenerationParams, window: usize) -> Self {
        Self {
            engine,
            state: SessionState::Uninitialized,
            history: History::new(window),
            params,
            cancel: CancelFlag::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Turn] {
        self.history.turns()
    }

    /// Start the engine. Idempotent: calling again while `Initializing` or
    /// `Ready` is a no-op. A `Failed` session stays failed until the host
    /// restarts the worker.
    pub fn initialize(&mut self, events: &mpsc::Sender<AppEvent>) {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Initializing | SessionState::Ready | SessionState::Generating => return,
            SessionState::Failed => {
                let _ = events.send(AppEvent::Error {
                    message: "session failed to initialize; restart required".to_string(),
                });
                return;
            }
        }

        self.state = SessionState::Initializing;
        let started = Instant::now();
        let mut timed_out = false;

        let result = self.engine.initialize(&mut |progress| {
            if started.elapsed() > INIT_TIMEOUT {
                timed_out = true;
                return false;
            }
            let _ = events.send(AppEvent::Progress {
                percent: progress.percent,
                message: progress.message,
            });
            true
        });

        if timed_out {
            tracing::error!(timeout_secs = INIT_TIMEOUT.as_secs(), "initialization timed out");
            self.state = SessionState::Failed;
            let _ = events.send(AppEvent::Error {
                message: format!(
                    "initialization did not finish within {}s",
                    INIT_TIMEOUT.as_secs()
                ),
            });
            return;
        }

        match result {
            Ok(()) => {
                self.state = SessionState::Ready;
                let _ = events.send(AppEvent::Ready);
            }
            Err(err) => {
                tracing::error!(%err, "engine initialization failed");
                self.state = SessionState::Failed;
                let _ = events.send(AppEvent::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Run one generation to completion.
    ///
    /// `poll` is invoked at every fragment boundary before the fragment is
    /// forwarded; it is the caller's hook for observing control traffic
    /// mid-generation (the worker drains its command channel there and sets
    /// the passed [`CancelFlag`] on a stop request). Once the flag is set no
    /// further fragments are forwarded and the engine is asked to abort.
    ///
    /// Exactly one terminal event (`Complete`, `Error` or `Stopped`) is
    /// emitted, after all `Token` events for this call.
    pub fn generate<F>(
        &mut self,
        message: &str,
        events: &mpsc::Sender<AppEvent>,
        poll: &mut F,
    ) -> GenerateOutcome
    where
        F: FnMut(&CancelFlag),
    {
        match self.state {
            SessionState::Ready => {}
            SessionState::Generating => {
                let _ = events.send(AppEvent::Error {
                    message: "a generation is already in flight".to_string(),
                });
                return GenerateOutcome::Rejected;
            }
            state => {
                let _ = events.send(AppEvent::Error {
                    message: format!("session is not ready ({state:?})"),
                });
                return GenerateOutcome::Rejected;
            }
        }

        self.state = SessionState::Generating;
        let context = self.history.context_for(message);
        let cancel = CancelFlag::new();
        self.cancel = cancel.clone();

        let mut on_fragment = |fragment: &str| -> bool {
            poll(&cancel);
            if cancel.is_set() {
                return false;
            }
            let _ = events.send(AppEvent::Token {
                text: Arc::from(fragment),
            });
            true
        };

        let result = self
            .engine
            .generate(&context, &self.params, &mut on_fragment);
        self.state = SessionState::Ready;

        match result {
            Ok(reply) => {
                if cancel.is_set() {
                    // The engine finished despite the stop request (it only
                    // checks at its own step boundaries). The partial or even
                    // full reply is still discarded.
                    let _ = events.send(AppEvent::Stopped);
                    return GenerateOutcome::Cancelled;
                }
                self.history.commit(message, &reply);
                let _ = events.send(AppEvent::Complete);
                GenerateOutcome::Completed
            }
            Err(EngineError::Aborted) => {
                tracing::debug!("generation cancelled");
                let _ = events.send(AppEvent::Stopped);
                GenerateOutcome::Cancelled
            }
            Err(err) => {
                tracing::error!(%err, "generation failed");
                let _ = events.send(AppEvent::Error {
                    message: err.to_string(),
                });
                GenerateOutcome::Failed
            }
        }
    }

    /// Signal cancellation of the in-flight generation, if any. Idempotent;
    /// each `generate` call opens a fresh flag, so a stale signal set while
    /// idle has no effect on later calls.
    pub fn stop(&self) {
        if self.state == SessionState::Generating {
            self.cancel.set();
        }
    }

    /// Clear the history. The worker serializes this behind any in-flight
    /// generation so it can never race a commit.
    pub fn reset(&mut self, events: &mpsc::Sender<AppEvent>) {
        self.history.clear();
        let _ = events.send(AppEvent::ResetComplete);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::chat::Role;
    use crate::engine::InitProgress;

    enum Script {
        /// Stream these fragments, then return the reply.
        Reply {
            fragments: Vec<&'static str>,
            reply: &'static str,
        },
        Fail(&'static str),
    }

    struct MockEngine {
        scripts: VecDeque<Script>,
        fail_init: bool,
    }

    impl MockEngine {
        fn scripted(scripts: Vec<Script>) -> Self {
            Self {
                scripts: scripts.into(),
                fail_init: false,
            }
        }

        fn failing_init() -> Self {
            Self {
                scripts: VecDeque::new(),
                fail_init: true,
            }
        }
    }

    impl GenerationEngine for MockEngine {
        fn initialize(
            &mut self,
            progress: &mut dyn FnMut(InitProgress) -> bool,
        ) -> Result<(), EngineError> {
            if !progress(InitProgress::new(50, "loading")) {
                return Err(EngineError::Init("aborted".into()));
            }
            if self.fail_init {
                return Err(EngineError::Init("weights missing".into()));
            }
            Ok(())
        }

        fn generate(
            &mut self,
            _turns: &[Turn],
            _params: &GenerationParams,
            on_fragment: &mut dyn FnMut(&str) -> bool,
        ) -> Result<String, EngineError> {
            match self.scripts.pop_front().expect("unscripted generate call") {
                Script::Reply { fragments, reply } => {
                    for fragment in fragments {
                        if !on_fragment(fragment) {
                            return Err(EngineError::Aborted);
                        }
                    }
                    Ok(reply.to_string())
                }
                Script::Fail(message) => Err(EngineError::Generation(message.into())),
            }
        }
    }

    fn ready_session(scripts: Vec<Script>) -> (InferenceSession<MockEngine>, mpsc::Receiver<AppEvent>, mpsc::Sender<AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut session = InferenceSession::new(MockEngine::scripted(scripts), GenerationParams::default(), 10);
        session.initialize(&tx);
        // Drain the progress/ready events so tests start clean.
        while rx.try_recv().is_ok() {}
        (session, rx, tx)
    }

    fn drain(rx: &mpsc::Receiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn initialize_is_idempotent() {
        let (tx, rx) = mpsc::channel();
        let mut session = InferenceSession::new(
            MockEngine::scripted(Vec::new()),
            GenerationParams::default(),
            10,
        );
        session.initialize(&tx);
        assert_eq!(session.state(), SessionState::Ready);
        let first = drain(&rx);
        assert!(matches!(first.last(), Some(AppEvent::Ready)));

        session.initialize(&tx);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(drain(&rx).is_empty(), "second initialize must be a no-op");
    }

    #[test]
    fn failed_initialization_is_terminal() {
        let (tx, rx) = mpsc::channel();
        let mut session =
            InferenceSession::new(MockEngine::failing_init(), GenerationParams::default(), 10);
        session.initialize(&tx);
        assert_eq!(session.state(), SessionState::Failed);
        let events = drain(&rx);
        assert!(matches!(events.last(), Some(AppEvent::Error { .. })));

        // Generating from a failed session is rejected.
        let outcome = session.generate("hi", &tx, &mut |_| {});
        assert_eq!(outcome, GenerateOutcome::Rejected);
        assert!(matches!(drain(&rx).last(), Some(AppEvent::Error { .. })));
    }

    #[test]
    fn successful_generation_streams_then_commits() {
        let (mut session, rx, tx) = ready_session(vec![Script::Reply {
            fragments: vec!["Hel", "lo!"],
            reply: "Hello!",
        }]);

        let outcome = session.generate("Hi", &tx, &mut |_| {});
        assert_eq!(outcome, GenerateOutcome::Completed);
        assert_eq!(session.state(), SessionState::Ready);

        let events = drain(&rx);
        let tokens: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                AppEvent::Token { text } => Some(text.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Hel", "lo!"]);
        assert!(
            matches!(events.last(), Some(AppEvent::Complete)),
            "terminal event must come last"
        );

        assert_eq!(
            session.history(),
            &[Turn::user("Hi"), Turn::assistant("Hello!")]
        );
    }

    #[test]
    fn engine_error_leaves_history_unchanged() {
        let (mut session, rx, tx) = ready_session(vec![
            Script::Reply {
                fragments: vec![],
                reply: "first",
            },
            Script::Fail("backend exploded"),
        ]);

        session.generate("a", &tx, &mut |_| {});
        let before: Vec<Turn> = session.history().to_vec();
        drain(&rx);

        let outcome = session.generate("b", &tx, &mut |_| {});
        assert_eq!(outcome, GenerateOutcome::Failed);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history(), before.as_slice(), "no partial commit");

        let events = drain(&rx);
        assert!(matches!(events.last(), Some(AppEvent::Error { .. })));
    }

    #[test]
    fn cancellation_emits_stopped_and_skips_commit() {
        let (mut session, rx, tx) = ready_session(vec![Script::Reply {
            fragments: vec!["a", "b", "c", "d"],
            reply: "abcd",
        }]);

        // Cancel arrives at the third fragment boundary: the first two
        // fragments stream through, then the engine aborts.
        let mut polls = 0;
        let outcome = session.generate("hi", &tx, &mut |cancel: &CancelFlag| {
            polls += 1;
            if polls == 3 {
                cancel.set();
            }
        });
        assert_eq!(outcome, GenerateOutcome::Cancelled);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.history().is_empty(), "cancelled call must not commit");

        let events = drain(&rx);
        let tokens = events
            .iter()
            .filter(|event| matches!(event, AppEvent::Token { .. }))
            .count();
        assert_eq!(tokens, 2);
        assert!(matches!(events.last(), Some(AppEvent::Stopped)));
    }

    #[test]
    fn stop_after_engine_finished_still_discards_reply() {
        let (mut session, rx, tx) = ready_session(vec![Script::Reply {
            fragments: vec!["x"],
            reply: "x",
        }]);

        // Flag set on the last fragment boundary; the mock aborts, but even
        // an engine that ignored the abort would be treated as stopped.
        let outcome = session.generate("hi", &tx, &mut |cancel: &CancelFlag| cancel.set());
        assert_eq!(outcome, GenerateOutcome::Cancelled);
        assert!(session.history().is_empty());
        assert!(matches!(drain(&rx).last(), Some(AppEvent::Stopped)));
    }

    #[test]
    fn context_reaches_engine_validated() {
        struct CapturingEngine {
            seen: Vec<Vec<Role>>,
        }
        impl GenerationEngine for CapturingEngine {
            fn initialize(
                &mut self,
                _progress: &mut dyn FnMut(InitProgress) -> bool,
            ) -> Result<(), EngineError> {
                Ok(())
            }
            fn generate(
                &mut self,
                turns: &[Turn],
                _params: &GenerationParams,
                _on_fragment: &mut dyn FnMut(&str) -> bool,
            ) -> Result<String, EngineError> {
                self.seen.push(turns.iter().map(|turn| turn.role).collect());
                Ok("ok".to_string())
            }
        }

        let (tx, rx) = mpsc::channel();
        let mut session = InferenceSession::new(
            CapturingEngine { seen: Vec::new() },
            GenerationParams::default(),
            10,
        );
        session.initialize(&tx);
        session.generate("one", &tx, &mut |_| {});
        session.generate("two", &tx, &mut |_| {});
        drain(&rx);

        assert_eq!(session.engine.seen[0], vec![Role::User]);
        assert_eq!(
            session.engine.seen[1],
            vec![Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn reset_clears_history() {
        let (mut session, rx, tx) = ready_session(vec![Script::Reply {
            fragments: vec![],
            reply: "pong",
        }]);
        session.generate("ping", &tx, &mut |_| {});
        drain(&rx);

        session.reset(&tx);
        assert!(session.history().is_empty());
        assert!(matches!(drain(&rx).last(), Some(AppEvent::ResetComplete)));
    }
}
