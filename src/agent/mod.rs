//! Agent module - drives one request to a final answer.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Seed the conversation with the user request
//! 2. Ask the model provider for a decision, passing the tool schemas
//! 3. If it asks for a tool, execute it and append the result (a retryable
//!    failure is appended too, so the model can adjust)
//! 4. Repeat until the provider produces a final answer or a limit is hit

mod agent_loop;
mod conversation;
mod prompt;
mod state;

pub use agent_loop::{Agent, RunError, RunLimits, RunResult};
pub use conversation::{ConversationState, Turn};
pub use prompt::build_system_prompt;
pub use state::RunState;
