//! Core agent loop implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{Decision, DecisionRequest, FinalAnswer, LlmError, ModelProvider, OpenAiClient, ToolCall};
use crate::tools::{Deps, ToolError, ToolRegistry, ToolResult};

use super::conversation::ConversationState;
use super::prompt::build_system_prompt;
use super::state::RunState;

/// Bounds that guarantee every run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum decisions requested from the provider.
    pub max_iterations: usize,
    /// Consecutive retryable failures tolerated per tool.
    pub max_tool_retries: usize,
    pub run_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_tool_retries: 3,
            run_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// Fatal run failures. No answer is produced.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Model provider failed: {0}")]
    Provider(#[from] LlmError),

    #[error("Model requested unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Missing credential for {tool}: {credential}")]
    MissingCredential { tool: String, credential: String },

    #[error("Max iterations ({0}) reached without a final answer")]
    MaxIterations(usize),

    #[error("Tool {tool} kept failing after {retries} retries")]
    RetriesExhausted { tool: String, retries: usize },

    #[error("Run exceeded its time budget of {0:?}")]
    Timeout(Duration),
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub answer: FinalAnswer,
    pub conversation: ConversationState,
    /// Decisions requested from the provider.
    pub iterations: usize,
}

/// The weather agent.
pub struct Agent {
    llm: Arc<dyn ModelProvider>,
    tools: ToolRegistry,
    system_prompt: String,
    limits: RunLimits,
}

impl Agent {
    /// Create an agent; the system prompt is built from the registered tools.
    pub fn new(llm: Arc<dyn ModelProvider>, tools: ToolRegistry, limits: RunLimits) -> Self {
        let system_prompt = build_system_prompt(&tools);
        Self {
            llm,
            tools,
            system_prompt,
            limits,
        }
    }

    /// Agent backed by the OpenAI-compatible API and the geocoding/weather tools.
    pub fn from_config(config: &Config) -> Self {
        let llm = OpenAiClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.default_model.clone(),
        )
        .with_timeout(config.run_timeout);
        let tools = ToolRegistry::weather_tools(config.geocode_base_url.clone());

        Self::new(Arc::new(llm), tools, config.limits())
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one request to a final answer.
    ///
    /// Retryable tool failures are fed back to the provider; everything else
    /// aborts the run.
    pub async fn run(&self, request: &str, deps: &Deps) -> Result<RunResult, RunError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, provider = self.llm.name());

        let mut state = RunState::AwaitingDecision;
        let outcome = tokio::time::timeout(
            self.limits.run_timeout,
            self.drive(request, deps, &mut state).instrument(span.clone()),
        )
        .await
        .unwrap_or(Err(RunError::Timeout(self.limits.run_timeout)));

        if let Err(e) = &outcome {
            span.in_scope(|| {
                transition(&mut state, RunState::Failed);
                warn!("Run failed: {}", e);
            });
        }

        outcome
    }

    async fn drive(
        &self,
        request: &str,
        deps: &Deps,
        state: &mut RunState,
    ) -> Result<RunResult, RunError> {
        info!("Starting run: {}", request);

        let tool_schemas = self.tools.get_tool_schemas();
        let mut conversation = ConversationState::new(request);
        let mut retries: HashMap<String, usize> = HashMap::new();

        for iteration in 0..self.limits.max_iterations {
            debug!("Agent iteration {}", iteration + 1);

            let decision = self
                .llm
                .decide(DecisionRequest {
                    system_prompt: &self.system_prompt,
                    conversation: &conversation,
                    tools: &tool_schemas,
                })
                .await?;

            match decision {
                Decision::ToolCall(call) => {
                    transition(state, RunState::ExecutingTool);
                    let result = self.execute_tool_call(&call, deps).await?;

                    if result.is_retry() {
                        let count = retries.entry(call.name.clone()).or_insert(0);
                        *count += 1;
                        if *count > self.limits.max_tool_retries {
                            return Err(RunError::RetriesExhausted {
                                tool: call.name,
                                retries: self.limits.max_tool_retries,
                            });
                        }
                    } else {
                        retries.remove(&call.name);
                    }

                    conversation.push_tool(call, result);
                    transition(state, RunState::AwaitingDecision);
                }
                Decision::Final(answer) => {
                    transition(state, RunState::Done);
                    info!("Final answer: {}", truncate_for_log(&answer.message, 2000));
                    conversation.push_final(answer.clone());
                    return Ok(RunResult {
                        answer,
                        conversation,
                        iterations: iteration + 1,
                    });
                }
            }
        }

        Err(RunError::MaxIterations(self.limits.max_iterations))
    }

    /// Execute a single tool call, sorting failures into retryable and fatal.
    async fn execute_tool_call(&self, call: &ToolCall, deps: &Deps) -> Result<ToolResult, RunError> {
        info!("Calling tool: {} with args: {}", call.name, call.arguments);

        let outcome = tokio::time::timeout(
            self.limits.tool_timeout,
            self.tools.execute(&call.name, &call.arguments, deps),
        )
        .await;

        let result = match outcome {
            Err(_) => ToolResult::Retry {
                reason: format!(
                    "Tool {} timed out after {:?}",
                    call.name, self.limits.tool_timeout
                ),
            },
            Ok(Ok(payload)) => ToolResult::Success { payload },
            Ok(Err(ToolError::ModelRetry(reason))) => ToolResult::Retry { reason },
            Ok(Err(ToolError::UnknownTool(name))) => return Err(RunError::UnknownTool(name)),
            Ok(Err(ToolError::InvalidArguments { tool, reason })) => {
                return Err(RunError::InvalidArguments { tool, reason })
            }
            Ok(Err(ToolError::MissingCredential { tool, credential })) => {
                return Err(RunError::MissingCredential { tool, credential })
            }
        };

        let summary = match &result {
            ToolResult::Success { payload } => serde_json::Value::Object(payload.clone()).to_string(),
            ToolResult::Retry { reason } => format!("Retry: {}", reason),
        };
        debug!("Tool {} result: {}", call.name, truncate_for_log(&summary, 1000));

        Ok(result)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal run transition {:?} -> {:?}",
        state,
        next
    );
    debug!(from = ?state, to = ?next, "Run state transition");
    *state = next;
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;
    use crate::tools::{Payload, Tool};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn call(id: &str, name: &str, args: Value) -> Decision {
        Decision::ToolCall(ToolCall::new(id, name, args))
    }

    fn finish(message: &str) -> Decision {
        Decision::Final(FinalAnswer::new(message))
    }

    fn agent(script: Vec<Decision>, limits: RunLimits) -> (Agent, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(script));
        let agent = Agent::new(
            provider.clone(),
            ToolRegistry::weather_tools("http://127.0.0.1:1"),
            limits,
        );
        (agent, provider)
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        fn returns_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: &Value, _deps: &Deps) -> Result<Payload, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Payload::new())
        }
    }

    #[tokio::test]
    async fn final_answer_without_tools() {
        let (agent, provider) = agent(vec![finish("Hello.")], RunLimits::default());
        let result = agent.run("hi", &Deps::default()).await.expect("run succeeds");

        assert_eq!(result.answer.message, "Hello.");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.conversation.len(), 2);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn retryable_failure_is_fed_back() {
        let (agent, provider) = agent(
            vec![
                call("c1", "get_weather", json!({"lat": 0.0, "lng": 0.0})),
                call("c2", "get_weather", json!({"lat": 37.7749, "lng": -122.4194})),
                finish("It is windy in San Francisco."),
            ],
            RunLimits::default(),
        );

        let result = agent.run("weather?", &Deps::default()).await.expect("run succeeds");
        let turns = result.conversation.turns();
        assert!(matches!(
            &turns[1],
            crate::agent::Turn::Tool { result: ToolResult::Retry { reason }, .. }
                if reason == "Could not find the location"
        ));
        assert!(matches!(
            &turns[2],
            crate::agent::Turn::Tool { result: ToolResult::Success { .. }, .. }
        ));
        // Each decision saw every earlier turn.
        assert_eq!(provider.seen_turns(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_run() {
        let (agent, _) = agent(
            vec![call("c1", "get_forecast", json!({})), finish("unreachable")],
            RunLimits::default(),
        );
        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownTool(ref name) if name == "get_forecast"));
    }

    #[tokio::test]
    async fn malformed_arguments_fail_the_run() {
        let (agent, _) = agent(
            vec![call("c1", "get_weather", json!({"latitude": 1.0})), finish("unreachable")],
            RunLimits::default(),
        );
        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::InvalidArguments { ref tool, .. } if tool == "get_weather"));
    }

    #[tokio::test]
    async fn missing_geo_key_fails_the_run() {
        let (agent, _) = agent(
            vec![call("c1", "get_lat_lng", json!({"location_description": "London"}))],
            RunLimits::default(),
        );
        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn iteration_cap_stops_endless_tool_use() {
        let script = (0..5)
            .map(|i| call(&format!("c{}", i), "get_weather", json!({"lat": 37.7749, "lng": -122.4194})))
            .collect();
        let limits = RunLimits {
            max_iterations: 3,
            ..RunLimits::default()
        };
        let (agent, provider) = agent(script, limits);

        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::MaxIterations(3)));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn consecutive_retries_are_capped_per_tool() {
        let retry = || call("c", "get_weather", json!({"lat": 0.0, "lng": 0.0}));
        let limits = RunLimits {
            max_tool_retries: 2,
            ..RunLimits::default()
        };
        let (agent, _) = agent(vec![retry(), retry(), retry(), finish("unreachable")], limits);

        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::RetriesExhausted { ref tool, retries: 2 } if tool == "get_weather"));
    }

    #[tokio::test]
    async fn success_resets_the_retry_count() {
        let retry = || call("c", "get_weather", json!({"lat": 0.0, "lng": 0.0}));
        let hit = || call("c", "get_weather", json!({"lat": 37.7749, "lng": -122.4194}));
        let limits = RunLimits {
            max_tool_retries: 1,
            ..RunLimits::default()
        };
        let (agent, _) = agent(vec![retry(), hit(), retry(), finish("Windy.")], limits);

        let result = agent.run("weather?", &Deps::default()).await.expect("run succeeds");
        assert_eq!(result.answer.message, "Windy.");
    }

    #[tokio::test]
    async fn provider_failure_is_fatal() {
        let (agent, _) = agent(vec![], RunLimits::default());
        let err = agent.run("weather?", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::Provider(LlmError::ScriptExhausted(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_becomes_a_retry() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("c1", "slow", json!({})),
            finish("gave up"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(SlowTool);
        let limits = RunLimits {
            tool_timeout: Duration::from_secs(1),
            run_timeout: Duration::from_secs(600),
            ..RunLimits::default()
        };
        let agent = Agent::new(provider, tools, limits);

        let result = agent.run("go", &Deps::default()).await.expect("run succeeds");
        assert!(matches!(
            &result.conversation.turns()[1],
            crate::agent::Turn::Tool { result: ToolResult::Retry { reason }, .. } if reason.contains("timed out")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_budget_is_enforced() {
        let provider = Arc::new(ScriptedProvider::new(vec![call("c1", "slow", json!({}))]));
        let mut tools = ToolRegistry::new();
        tools.register(SlowTool);
        let limits = RunLimits {
            tool_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(5),
            ..RunLimits::default()
        };
        let agent = Agent::new(provider, tools, limits);

        let err = agent.run("go", &Deps::default()).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("héllo", 2), "h... [truncated]");
    }
}
