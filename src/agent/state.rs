//! Run state machine.

use serde::Serialize;

/// State of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for the model provider's next decision.
    AwaitingDecision,
    /// Running the tool the provider asked for.
    ExecutingTool,
    /// A final answer was produced.
    Done,
    /// The run aborted with a fatal error.
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (AwaitingDecision, ExecutingTool)
                | (AwaitingDecision, Done)
                | (AwaitingDecision, Failed)
                | (ExecutingTool, AwaitingDecision)
                | (ExecutingTool, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_loop() {
        use RunState::*;
        assert!(AwaitingDecision.can_transition_to(ExecutingTool));
        assert!(ExecutingTool.can_transition_to(AwaitingDecision));
        assert!(AwaitingDecision.can_transition_to(Done));
        assert!(ExecutingTool.can_transition_to(Failed));

        assert!(!ExecutingTool.can_transition_to(Done));
        assert!(!Done.can_transition_to(AwaitingDecision));
        assert!(!Failed.can_transition_to(ExecutingTool));
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::AwaitingDecision.is_terminal());
        assert!(!RunState::ExecutingTool.is_terminal());
    }
}
