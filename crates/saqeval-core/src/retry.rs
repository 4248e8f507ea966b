//! Per-question retry state machine and its keyed state store.
//!
//! Each `(session_id, question_id)` pair moves through
//! `Fresh -> RetryGranted -> Exhausted`. A `partially_correct` first answer
//! grants exactly one retry; whatever happens on the retry, the question is
//! then closed. Questions decided on their first answer close immediately.
//!
//! The store hands out one async lock per key. Submissions for different keys
//! never contend; submissions for the same key are serialized for the whole
//! evaluation, and the state only changes when a guard is explicitly resolved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::FeedbackCategory;

/// Where a question stands within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPhase {
    /// No attempt consumed.
    #[default]
    Fresh,
    /// One `partially_correct` attempt consumed; the student is answering again.
    RetryGranted,
    /// Closed. No further retries regardless of outcome.
    Exhausted,
}

/// Snapshot of one key's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub phase: RetryPhase,
    /// Completed submissions for this question.
    pub submissions: u32,
    /// Whether the question ever entered `RetryGranted`.
    #[serde(default)]
    pub retry_granted: bool,
}

impl RetryState {
    /// Retries consumed: 0 until a retry has been granted, 1 afterwards.
    pub fn attempts_used(&self) -> u8 {
        u8::from(self.retry_granted)
    }
}

/// What the controller decided for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: RetryPhase,
    pub advance: bool,
    pub is_correct: bool,
    pub requires_retry: bool,
}

/// The transition function.
pub fn transition(phase: RetryPhase, evaluation: FeedbackCategory) -> Transition {
    let is_correct = evaluation == FeedbackCategory::Correct;
    match (phase, evaluation) {
        (RetryPhase::Fresh, FeedbackCategory::PartiallyCorrect) => Transition {
            next: RetryPhase::RetryGranted,
            advance: false,
            is_correct: false,
            requires_retry: true,
        },
        (RetryPhase::Fresh, _) | (RetryPhase::RetryGranted, _) | (RetryPhase::Exhausted, _) => {
            Transition {
                next: RetryPhase::Exhausted,
                advance: true,
                is_correct,
                requires_retry: false,
            }
        }
    }
}

/// Transition for a submission judged without the model. Never holds.
pub fn forced_advance(is_correct: bool) -> Transition {
    Transition {
        next: RetryPhase::Exhausted,
        advance: true,
        is_correct,
        requires_retry: false,
    }
}

/// Identifies one question within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetryKey {
    pub session_id: String,
    pub question_id: String,
}

impl RetryKey {
    pub fn new(session_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            question_id: question_id.into(),
        }
    }
}

type Slot = Arc<AsyncMutex<RetryState>>;

/// Keyed retry state with per-key mutual exclusion.
#[derive(Default)]
pub struct RetryStore {
    slots: Mutex<HashMap<RetryKey, Slot>>,
}

impl RetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RetryKey, Slot>> {
        // A poisoned map is still structurally valid; keep serving.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for exclusive access to `key`, creating its state lazily.
    pub async fn acquire(&self, key: RetryKey) -> RetryGuard {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let state = slot.lock_owned().await;
        RetryGuard { key, state }
    }

    /// Current state of `key` without taking its lock. Keys that are locked
    /// mid-evaluation report their pre-evaluation state.
    pub async fn snapshot(&self, key: &RetryKey) -> RetryState {
        let slot = self.slots().get(key).cloned();
        match slot {
            Some(slot) => *slot.lock().await,
            None => RetryState::default(),
        }
    }

    /// Drop all state for a session. Returns the number of questions removed.
    ///
    /// Questions with a submission in flight, or waiting for one, are kept so
    /// their resolution is not lost.
    pub fn forget_session(&self, session_id: &str) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|key, slot| key.session_id != session_id || Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    /// Number of tracked questions across all sessions.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key's state for the lifetime of one submission.
///
/// Dropping the guard without calling [`RetryGuard::resolve`] leaves the state
/// untouched, so an abandoned evaluation consumes nothing.
pub struct RetryGuard {
    key: RetryKey,
    state: OwnedMutexGuard<RetryState>,
}

impl RetryGuard {
    pub fn key(&self) -> &RetryKey {
        &self.key
    }

    pub fn state(&self) -> RetryState {
        *self.state
    }

    /// 1-based number of the submission being evaluated.
    pub fn attempt(&self) -> u32 {
        self.state.submissions + 1
    }

    /// Apply the controller's decision for a fully-computed evaluation.
    pub fn resolve(mut self, evaluation: FeedbackCategory) -> Transition {
        let decided = transition(self.state.phase, evaluation);
        self.commit(decided)
    }

    /// Close the question without a model verdict.
    pub fn resolve_forced(mut self, is_correct: bool) -> Transition {
        let decided = forced_advance(is_correct);
        self.commit(decided)
    }

    fn commit(&mut self, decided: Transition) -> Transition {
        if self.state.phase == RetryPhase::Exhausted {
            tracing::warn!(
                session_id = %self.key.session_id,
                question_id = %self.key.question_id,
                "submission for a closed question, advancing"
            );
        }
        self.state.phase = decided.next;
        self.state.retry_granted |= decided.next == RetryPhase::RetryGranted;
        self.state.submissions += 1;
        decided
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::FeedbackCategory::{Correct, Incorrect, PartiallyCorrect};

    #[test]
    fn fresh_transitions() {
        let t = transition(RetryPhase::Fresh, Correct);
        assert!(t.advance && t.is_correct && !t.requires_retry);

        let t = transition(RetryPhase::Fresh, Incorrect);
        assert!(t.advance && !t.is_correct && !t.requires_retry);

        let t = transition(RetryPhase::Fresh, PartiallyCorrect);
        assert_eq!(t.next, RetryPhase::RetryGranted);
        assert!(!t.advance && !t.is_correct && t.requires_retry);
    }

    #[test]
    fn retry_always_closes() {
        for category in [Correct, PartiallyCorrect, Incorrect] {
            let t = transition(RetryPhase::RetryGranted, category);
            assert_eq!(t.next, RetryPhase::Exhausted);
            assert!(t.advance);
            assert!(!t.requires_retry);
            assert_eq!(t.is_correct, category == Correct);
        }
    }

    #[test]
    fn exhausted_advances_defensively() {
        for category in [Correct, PartiallyCorrect, Incorrect] {
            let t = transition(RetryPhase::Exhausted, category);
            assert_eq!(t.next, RetryPhase::Exhausted);
            assert!(t.advance && !t.requires_retry);
        }
    }

    #[test]
    fn attempts_used() {
        let fresh = RetryState::default();
        assert_eq!(fresh.attempts_used(), 0);
        let granted = RetryState {
            phase: RetryPhase::RetryGranted,
            submissions: 1,
            retry_granted: true,
        };
        assert_eq!(granted.attempts_used(), 1);
        let closed_first_try = RetryState {
            phase: RetryPhase::Exhausted,
            submissions: 1,
            retry_granted: false,
        };
        assert_eq!(closed_first_try.attempts_used(), 0);
    }

    #[tokio::test]
    async fn resubmitting_a_closed_question_uses_no_retry() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");
        store.acquire(key.clone()).await.resolve(Incorrect);
        store.acquire(key.clone()).await.resolve(PartiallyCorrect);

        let state = store.snapshot(&key).await;
        assert_eq!(state.phase, RetryPhase::Exhausted);
        assert_eq!(state.submissions, 2);
        assert_eq!(state.attempts_used(), 0);
    }

    #[tokio::test]
    async fn granted_retry_is_remembered_after_close() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");
        store.acquire(key.clone()).await.resolve(PartiallyCorrect);
        store.acquire(key.clone()).await.resolve(Incorrect);
        assert_eq!(store.snapshot(&key).await.attempts_used(), 1);
    }

    #[tokio::test]
    async fn guard_resolution_updates_state() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");

        let guard = store.acquire(key.clone()).await;
        assert_eq!(guard.attempt(), 1);
        let t = guard.resolve(PartiallyCorrect);
        assert!(t.requires_retry);

        let guard = store.acquire(key.clone()).await;
        assert_eq!(guard.attempt(), 2);
        let t = guard.resolve(PartiallyCorrect);
        assert!(t.advance && !t.requires_retry);

        let state = store.snapshot(&key).await;
        assert_eq!(state.phase, RetryPhase::Exhausted);
        assert_eq!(state.submissions, 2);
    }

    #[tokio::test]
    async fn dropped_guard_changes_nothing() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");

        drop(store.acquire(key.clone()).await);
        assert_eq!(store.snapshot(&key).await, RetryState::default());
    }

    #[tokio::test]
    async fn forced_resolution_closes_question() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");
        let t = store.acquire(key.clone()).await.resolve_forced(true);
        assert!(t.advance && t.is_correct && !t.requires_retry);
        assert_eq!(store.snapshot(&key).await.phase, RetryPhase::Exhausted);
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let store = Arc::new(RetryStore::new());
        let key = RetryKey::new("s1", "q1");

        let first = store.acquire(key.clone()).await;

        let contender = {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.acquire(key).await.resolve(PartiallyCorrect) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let t = first.resolve(PartiallyCorrect);
        assert!(t.requires_retry);

        let second = contender.await.unwrap();
        assert!(second.advance && !second.requires_retry);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let store = RetryStore::new();
        let _held = store.acquire(RetryKey::new("s1", "q1")).await;
        let other = tokio::time::timeout(
            Duration::from_millis(100),
            store.acquire(RetryKey::new("s1", "q2")),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn forget_session_only_drops_that_session() {
        let store = RetryStore::new();
        store.acquire(RetryKey::new("s1", "q1")).await.resolve(Correct);
        store.acquire(RetryKey::new("s1", "q2")).await.resolve(Correct);
        store.acquire(RetryKey::new("s2", "q1")).await.resolve(Correct);

        assert_eq!(store.forget_session("s1"), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn forget_session_keeps_questions_in_flight() {
        let store = RetryStore::new();
        let key = RetryKey::new("s1", "q1");
        store.acquire(RetryKey::new("s1", "q2")).await.resolve(Correct);

        let held = store.acquire(key.clone()).await;
        assert_eq!(store.forget_session("s1"), 1);
        held.resolve(PartiallyCorrect);

        let state = store.snapshot(&key).await;
        assert_eq!(state.phase, RetryPhase::RetryGranted);
        assert_eq!(state.submissions, 1);

        assert_eq!(store.forget_session("s1"), 1);
        assert!(store.is_empty());
    }
}
