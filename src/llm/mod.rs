//! Model provider abstraction.
//!
//! The agent loop asks a provider for one decision at a time: either run a
//! tool or finish with a [`FinalAnswer`]. Providers are stateless; the full
//! conversation is passed on every call.

mod openai;
mod scripted;
mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::ConversationState;
use crate::tools::ToolSchema;

pub use openai::OpenAiClient;
pub use scripted::ScriptedProvider;
pub use types::{Decision, FinalAnswer, ToolCall};

/// Name of the pseudo-tool through which the model delivers its final answer.
pub const FINAL_RESULT_TOOL: &str = "final_result";

/// Errors that can occur when asking a provider for a decision.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Malformed arguments for tool {tool}: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("Decision script exhausted after {0} decisions")]
    ScriptExhausted(usize),
}

/// Everything a provider sees when deciding the next step.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub system_prompt: &'a str,
    pub conversation: &'a ConversationState,
    pub tools: &'a [ToolSchema],
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logs (e.g. "openai").
    fn name(&self) -> &str;

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, LlmError>;
}
