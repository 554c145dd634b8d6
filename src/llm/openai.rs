//! OpenAI-compatible chat completions provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Decision, DecisionRequest, FinalAnswer, LlmError, ModelProvider, ToolCall, FINAL_RESULT_TOOL};
use crate::agent::{ConversationState, Turn};
use crate::tools::{ToolResult, ToolSchema};

/// Appended to retry reasons so the model knows to change its call.
const RETRY_SUFFIX: &str = "Fix the errors and try again.";

/// Client for `POST {base_url}/chat/completions`.
///
/// The final answer is offered to the model as an extra `final_result`
/// function and tool use is required, so every reply is a tool call.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &DecisionRequest<'_>) -> ChatRequest {
        let mut tools: Vec<ChatTool> = request.tools.iter().map(ChatTool::from).collect();
        tools.push(ChatTool::function(
            FINAL_RESULT_TOOL,
            "The final response which ends this conversation",
            FinalAnswer::schema(),
        ));

        ChatRequest {
            model: self.model.clone(),
            messages: to_chat_messages(request.system_prompt, request.conversation),
            tools,
            tool_choice: "required".to_string(),
            parallel_tool_calls: false,
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey("OPENAI_API_KEY".to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(&request);

        debug!(
            model = %self.model,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse completion: {}", e)))?;

        parse_decision(completion)
    }
}

/// Turn a completion into a decision, taking only the first tool call.
fn parse_decision(completion: ChatResponse) -> Result<Decision, LlmError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::InvalidResponse("Completion has no choices".to_string()))?;

    let mut calls = message.tool_calls.unwrap_or_default().into_iter();
    let call = match calls.next() {
        Some(call) => call,
        None => {
            return Err(LlmError::InvalidResponse(format!(
                "Expected a tool call, got text: {}",
                message.content.unwrap_or_default()
            )))
        }
    };
    let ignored = calls.count();
    if ignored > 0 {
        warn!(ignored, "Model returned several tool calls; only the first is executed");
    }

    let arguments: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
        LlmError::MalformedArguments {
            tool: call.function.name.clone(),
            reason: e.to_string(),
        }
    })?;

    if call.function.name == FINAL_RESULT_TOOL {
        let answer: FinalAnswer =
            serde_json::from_value(arguments).map_err(|e| LlmError::MalformedArguments {
                tool: FINAL_RESULT_TOOL.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(Decision::Final(answer));
    }

    if !arguments.is_object() {
        return Err(LlmError::MalformedArguments {
            tool: call.function.name,
            reason: "arguments must be a JSON object".to_string(),
        });
    }

    Ok(Decision::ToolCall(ToolCall {
        id: call.id,
        name: call.function.name,
        arguments,
    }))
}

fn to_chat_messages(system_prompt: &str, conversation: &ConversationState) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::text("system", system_prompt)];

    for turn in conversation.turns() {
        match turn {
            Turn::User { message } => messages.push(ChatMessage::text("user", message)),
            Turn::Tool { call, result } => {
                messages.push(ChatMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![ChatToolCall {
                        id: call.id.clone(),
                        call_type: "function".to_string(),
                        function: ChatFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    }]),
                    tool_call_id: None,
                });

                let content = match result {
                    ToolResult::Success { payload } => Value::Object(payload.clone()).to_string(),
                    ToolResult::Retry { reason } => format!("{}\n\n{}", reason, RETRY_SUFFIX),
                };
                messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                });
            }
            Turn::Final { answer } => messages.push(ChatMessage::text("assistant", &answer.message)),
        }
    }

    messages
}

// Chat completions API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ChatTool>,
    tool_choice: String,
    parallel_tool_calls: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    /// JSON-encoded arguments object.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunctionDef,
}

impl ChatTool {
    fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ChatFunctionDef {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

impl From<&ToolSchema> for ChatTool {
    fn from(schema: &ToolSchema) -> Self {
        Self::function(&schema.name, &schema.description, schema.parameters.clone())
    }
}

#[derive(Debug, Serialize)]
struct ChatFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
