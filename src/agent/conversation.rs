//! Conversation history of a single run.

use serde::Serialize;

use crate::llm::{FinalAnswer, ToolCall};
use crate::tools::ToolResult;

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum Turn {
    User { message: String },
    /// A tool call is only ever stored together with its result.
    Tool { call: ToolCall, result: ToolResult },
    Final { answer: FinalAnswer },
}

/// Append-only turn log for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::User {
                message: user_message.into(),
            }],
        }
    }

    pub fn push_tool(&mut self, call: ToolCall, result: ToolResult) {
        self.turns.push(Turn::Tool { call, result });
    }

    pub fn push_final(&mut self, answer: FinalAnswer) {
        self.turns.push(Turn::Final { answer });
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

    /// Tool calls in the order they were executed.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns.iter().filter_map(|turn| match turn {
            Turn::Tool { call, .. } => Some(call),
            _ => None,
        })
    }

    /// Number of executed calls to the named tool.
    pub fn count_calls(&self, tool: &str) -> usize {
        self.tool_calls().filter(|c| c.name == tool).count()
    }

    pub fn final_answer(&self) -> Option<&FinalAnswer> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Final { answer } => Some(answer),
            _ => None,
        })
    }
}
