//! Provider that replays a fixed list of decisions.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Decision, DecisionRequest, LlmError, ModelProvider};

/// Deterministic provider for replays and tests.
///
/// Returns the scripted decisions in order, regardless of the conversation,
/// and remembers the conversation length seen by each request.
pub struct ScriptedProvider {
    script: Vec<Decision>,
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    next: usize,
    seen_turns: Vec<usize>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Decision>) -> Self {
        Self {
            script,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Number of decisions handed out so far.
    pub fn calls(&self) -> usize {
        self.lock().next
    }

    /// Conversation length passed to each `decide` call.
    pub fn seen_turns(&self) -> Vec<usize> {
        self.lock().seen_turns.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // The guarded data stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, LlmError> {
        let mut state = self.lock();
        state.seen_turns.push(request.conversation.len());

        let decision = self
            .script
            .get(state.next)
            .cloned()
            .ok_or(LlmError::ScriptExhausted(self.script.len()))?;
        state.next += 1;
        Ok(decision)
    }
}
