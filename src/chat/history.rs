//! Committed conversation history with a bounded retention window.
//!
//! The engine this feeds requires a strictly alternating user/assistant
//! sequence that starts and ends on a user turn. Rather than trusting
//! incremental updates to keep that shape, validity is re-derived from
//! scratch on every context build and every commit, so the history is
//! self-healing even if a caller bypasses the normal commit path.

use super::{Role, Turn};

/// Default retention window, in turns (pairs count double).
pub const DEFAULT_WINDOW: usize = 10;

pub struct History {
    turns: Vec<Turn>,
    window: usize,
}

impl History {
    /// `window` is the maximum number of retained turns. It must be even so
    /// that trimming always drops whole user/assistant pairs; odd values are
    /// rounded down.
    pub fn new(window: usize) -> Self {
        let window = (window.max(2) / 2) * 2;
        Self {
            turns: Vec::new(),
            window,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Build the context to submit to the engine for `message`.
    ///
    /// Takes the most recent window of committed turns, appends the new user
    /// message, and validates the result into an alternating sequence that
    /// starts with a user turn. If validation empties the sequence or leaves
    /// it ending on a non-user turn, falls back to the bare user message so
    /// every request is well-formed no matter how corrupted the stored
    /// history is.
    pub fn context_for(&self, message: &str) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(self.window);
        let mut candidate: Vec<Turn> = self.turns[start..].to_vec();
        candidate.push(Turn::user(message));

        let validated = validate(candidate);
        let ends_on_user = validated.last().map(|turn| turn.role) == Some(Role::User);
        if !ends_on_user {
            // A triggered fallback usually means the stored history drifted
            // (e.g. a trimming bug); surface it instead of hiding it.
            tracing::warn!(
                history_len = self.turns.len(),
                "context validation discarded the history window, falling back to the bare user message"
            );
            return vec![Turn::user(message)];
        }
        validated
    }

    /// Commit a completed exchange. Called only after a successful,
    /// non-cancelled generation; failed or cancelled generations never reach
    /// this point, so the history observes no partial state.
    pub fn commit(&mut self, message: &str, reply: &str) {
        if self.turns.last().map(|turn| turn.role) != Some(Role::User) {
            self.turns.push(Turn::user(message));
        }
        if self.turns.last().map(|turn| turn.role) != Some(Role::Assistant) {
            self.turns.push(Turn::assistant(reply));
        }

        let start = self.turns.len().saturating_sub(self.window);
        let retained = self.turns.split_off(start);
        // Second pass over the retained tail guards against any accumulated
        // inconsistency, not just the edit we just made.
        self.turns = validate(retained);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Left-to-right validation: keep only turns that preserve the
/// user-first, strictly-alternating invariants.
fn validate(candidate: Vec<Turn>) -> Vec<Turn> {
    let mut kept: Vec<Turn> = Vec::with_capacity(candidate.len());
    for turn in candidate {
        match kept.last() {
            None => {
                if turn.role == Role::User {
                    kept.push(turn);
                }
            }
            Some(prev) => {
                if prev.role != turn.role {
                    kept.push(turn);
                }
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(turns: &[Turn]) -> Vec<Role> {
        turns.iter().map(|turn| turn.role).collect()
    }

    fn assert_alternating(turns: &[Turn]) {
        if let Some(first) = turns.first() {
            assert_eq!(first.role, Role::User, "history must start with a user turn");
        }
        for pair in turns.windows(2) {
            assert_ne!(pair[0].role, pair[1].role, "roles must alternate");
        }
    }

    #[test]
    fn empty_history_yields_single_user_context() {
        let history = History::new(10);
        let context = history.context_for("Hi");
        assert_eq!(context, vec![Turn::user("Hi")]);
    }

    #[test]
    fn first_exchange_commits_a_pair() {
        let mut history = History::new(10);
        history.commit("Hi", "Hello!");
        assert_eq!(
            history.turns(),
            &[Turn::user("Hi"), Turn::assistant("Hello!")]
        );
    }

    #[test]
    fn context_includes_prior_turns_and_new_message() {
        let mut history = History::new(10);
        history.commit("Hi", "Hello!");
        let context = history.context_for("How are you?");
        assert_eq!(
            roles(&context),
            vec![Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(context.last().unwrap().content, "How are you?");
    }

    #[test]
    fn window_cap_drops_oldest_pair() {
        let mut history = History::new(10);
        for i in 0..6 {
            history.commit(&format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(history.len(), 10);
        assert_alternating(history.turns());
        // q0/a0 fell off the front.
        assert_eq!(history.turns()[0].content, "q1");
        assert_eq!(history.turns()[9].content, "a5");
    }

    #[test]
    fn corrupted_assistant_first_history_falls_back() {
        let mut history = History::new(10);
        // Simulate drift by committing then manually corrupting through the
        // public surface: a window of 2 with repeated commits can't produce
        // this, so build it via validate-bypassing construction.
        history.turns = vec![Turn::assistant("x")];
        let context = history.context_for("hello");
        assert_eq!(context, vec![Turn::user("hello")]);
    }

    #[test]
    fn duplicate_roles_are_dropped_during_validation() {
        let mut history = History::new(10);
        history.turns = vec![
            Turn::user("a"),
            Turn::user("b"),
            Turn::assistant("c"),
            Turn::assistant("d"),
        ];
        let context = history.context_for("e");
        assert_eq!(
            roles(&context),
            vec![Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(context[0].content, "a");
        assert_eq!(context[1].content, "c");
        assert_eq!(context[2].content, "e");
    }

    #[test]
    fn commit_onto_corrupted_tail_self_heals() {
        let mut history = History::new(10);
        history.turns = vec![Turn::user("stale")];
        history.commit("fresh", "reply");
        assert_alternating(history.turns());
        // The stale user turn absorbs the pairing; the reply still lands.
        assert_eq!(history.turns().last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn odd_window_rounds_down_to_pairs() {
        let history = History::new(7);
        assert_eq!(history.window(), 6);
        let history = History::new(1);
        assert_eq!(history.window(), 2);
    }

    #[test]
    fn clear_empties_history() {
        let mut history = History::new(10);
        history.commit("Hi", "Hello!");
        history.clear();
        assert!(history.is_empty());
    }
}
