//! Tools the model can call, and the registry that dispatches them by name.
//!
//! A tool either succeeds with a JSON object payload, asks the model to try
//! again (`ToolError::ModelRetry`), or fails the run with a structural error.

mod location;
mod weather;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use location::LocationResolver;
pub use weather::WeatherLookup;

/// Named fields returned by a successful tool call.
pub type Payload = Map<String, Value>;

/// Credentials handed to every tool invocation of a run.
///
/// Owned by the caller and only ever borrowed by tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deps {
    /// Weather service API key
    pub weather_api_key: Option<String>,

    /// Geocoding service API key
    pub geo_api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// Not fatal: the reason is fed back to the model so it can adjust its next call.
    #[error("{0}")]
    ModelRetry(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Missing credential for {tool}: {credential}")]
    MissingCredential { tool: String, credential: String },
}

impl ToolError {
    pub fn invalid_args(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelRetry(_))
    }
}

/// Outcome of a tool call as recorded in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { payload: Payload },
    Retry { reason: String },
}

impl ToolResult {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// A callable the model may invoke mid-run.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// JSON schema of the success payload.
    fn returns_schema(&self) -> Value;

    async fn execute(&self, args: &Value, deps: &Deps) -> Result<Payload, ToolError>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Everything the model provider needs to know about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub returns: Value,
}

/// Tools available to the agent, keyed by exact name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the geocoding and weather tools.
    pub fn weather_tools(geocode_base_url: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(LocationResolver::new(geocode_base_url));
        registry.register(WeatherLookup);
        registry
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Full schemas, sorted by name so every request sees the same order.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
                returns: t.returns_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Run a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: &Value,
        deps: &Deps,
    ) -> Result<Payload, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args, deps).await
    }
}

/// Read a required float argument.
pub(crate) fn f64_arg(tool: &str, args: &Value, key: &str) -> Result<f64, ToolError> {
    args[key]
        .as_f64()
        .ok_or_else(|| ToolError::invalid_args(tool, format!("Missing or non-numeric '{}' argument", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weather_tools_are_listed_by_name() {
        let registry = ToolRegistry::weather_tools("http://localhost:1");
        assert_eq!(registry.len(), 2);

        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_lat_lng", "get_weather"]);
    }

    #[test]
    fn schemas_declare_parameters_and_returns() {
        let registry = ToolRegistry::weather_tools("http://localhost:1");
        let schemas = registry.get_tool_schemas();

        let lat_lng = &schemas[0];
        assert_eq!(lat_lng.name, "get_lat_lng");
        assert_eq!(lat_lng.parameters["required"], json!(["location_description"]));
        assert_eq!(lat_lng.returns["required"], json!(["lat", "lng"]));

        let weather = &schemas[1];
        assert_eq!(weather.name, "get_weather");
        assert_eq!(weather.parameters["required"], json!(["lat", "lng"]));
        assert_eq!(weather.returns["required"], json!(["temp", "description"]));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::weather_tools("http://localhost:1");
        let err = registry
            .execute("get_forecast", &json!({}), &Deps::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "get_forecast"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn execute_dispatches_by_exact_name() {
        let registry = ToolRegistry::weather_tools("http://localhost:1");
        let payload = registry
            .execute("get_weather", &json!({"lat": 37.7749, "lng": -122.4194}), &Deps::default())
            .await
            .expect("stubbed coordinates");
        assert_eq!(payload["description"], json!("Windy"));

        let err = registry
            .execute("GET_WEATHER", &json!({"lat": 37.7749, "lng": -122.4194}), &Deps::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn f64_arg_rejects_missing_and_non_numeric() {
        assert_eq!(f64_arg("t", &json!({"lat": 1.5}), "lat").unwrap(), 1.5);
        assert!(matches!(
            f64_arg("t", &json!({}), "lat"),
            Err(ToolError::InvalidArguments { .. })
        ));
        assert!(matches!(
            f64_arg("t", &json!({"lat": "north"}), "lat"),
            Err(ToolError::InvalidArguments { .. })
        ));
    }
}
