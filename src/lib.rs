//! # Weather Agent
//!
//! A small tool-calling agent that answers weather questions.
//!
//! This library provides:
//! - Two tools: `get_lat_lng` (geocoding) and `get_weather` (observation lookup)
//! - A tool registry that dispatches calls by exact name
//! - An agent loop that asks a model provider for one decision at a time
//! - An OpenAI-compatible provider and a scripted provider for replays
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Build context with system prompt, user request and tool schemas
//! 2. Ask the provider for a decision
//! 3. Execute the requested tool and append its result to the conversation
//! 4. Repeat until the provider returns a final answer
//!
//! ## Example
//!
//! ```rust,ignore
//! use weather_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::from_config(&config);
//! let result = agent.run("What is the weather like in London?", &config.deps()).await?;
//! println!("{}", result.answer.message);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
