//! Configuration management for the weather agent.
//!
//! Configuration can be set via environment variables (a `.env` file in the
//! working directory is loaded first by the binary):
//! - `OPENAI_API_KEY` - Optional at load time, required when the model is called.
//! - `WEATHER_API_KEY` - Optional. Weather service API key.
//! - `GEO_API_KEY` - Optional at load time, required when a location is geocoded.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to `gpt-3.5-turbo`.
//! - `OPENAI_BASE_URL` - Optional. Chat completions API base. Defaults to `https://api.openai.com/v1`.
//! - `GEOCODE_BASE_URL` - Optional. Geocoding API base. Defaults to `https://api.geoapify.com/v1`.
//! - `MAX_ITERATIONS` - Optional. Maximum decision steps per run. Defaults to `10`.
//! - `MAX_TOOL_RETRIES` - Optional. Consecutive retryable failures allowed per tool. Defaults to `3`.
//! - `RUN_TIMEOUT_SECS` - Optional. Wall-clock budget per run. Defaults to `120`.
//! - `TOOL_TIMEOUT_SECS` - Optional. Budget per tool call. Defaults to `30`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agent::RunLimits;
use crate::tools::Deps;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEOCODE_BASE_URL: &str = "https://api.geoapify.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model provider API key
    pub openai_api_key: Option<String>,

    /// Weather service API key
    pub weather_api_key: Option<String>,

    /// Geocoding service API key
    pub geo_api_key: Option<String>,

    /// LLM model identifier
    pub default_model: String,

    /// Base URL of the OpenAI-compatible chat API
    pub openai_base_url: String,

    /// Base URL of the geocoding API
    pub geocode_base_url: String,

    /// Maximum decision steps for the agent loop
    pub max_iterations: usize,

    /// Consecutive retryable failures tolerated per tool
    pub max_tool_retries: usize,

    /// Wall-clock budget for a whole run
    pub run_timeout: Duration,

    /// Budget for a single tool call
    pub tool_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_iterations = parse_or(&lookup, "MAX_ITERATIONS", 10usize)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            weather_api_key: non_empty("WEATHER_API_KEY"),
            geo_api_key: non_empty("GEO_API_KEY"),
            default_model: non_empty("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            geocode_base_url: non_empty("GEOCODE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEOCODE_BASE_URL.to_string()),
            max_iterations,
            max_tool_retries: parse_or(&lookup, "MAX_TOOL_RETRIES", 3usize)?,
            run_timeout: Duration::from_secs(parse_or(&lookup, "RUN_TIMEOUT_SECS", 120u64)?),
            tool_timeout: Duration::from_secs(parse_or(&lookup, "TOOL_TIMEOUT_SECS", 30u64)?),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(openai_base_url: String, geocode_base_url: String) -> Self {
        Self {
            openai_api_key: None,
            weather_api_key: None,
            geo_api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            openai_base_url,
            geocode_base_url,
            max_iterations: 10,
            max_tool_retries: 3,
            run_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }

    /// Credentials handed to the tools for one run.
    pub fn deps(&self) -> Deps {
        Deps {
            weather_api_key: self.weather_api_key.clone(),
            geo_api_key: self.geo_api_key.clone(),
        }
    }

    /// Bounds applied to each run of the agent loop.
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            max_iterations: self.max_iterations,
            max_tool_retries: self.max_tool_retries,
            run_timeout: self.run_timeout,
            tool_timeout: self.tool_timeout,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        _ => Ok(default),
    }
}
