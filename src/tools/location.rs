//! Geocoding tool: free-text place name to coordinates.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Deps, Payload, Tool, ToolError};

const NAME: &str = "get_lat_lng";

/// Resolve a location description with the Geoapify geocoding search API.
pub struct LocationResolver {
    client: reqwest::Client,
    base_url: String,
}

impl LocationResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("weather-agent/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn geocode(&self, description: &str, api_key: &str) -> Option<(f64, f64)> {
        let url = format!("{}/geocode/search", self.base_url);

        let response = match self
            .client
            .get(&url)
            .query(&[("text", description), ("apiKey", api_key), ("format", "json")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Geocoding request failed: {}", e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Geocoding service returned {}", status);
            return None;
        }

        let body: GeocodeResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to parse geocoding response: {}", e);
                return None;
            }
        };

        body.results.first().map(|c| (c.lat, c.lon))
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeocodeCandidate {
    lat: f64,
    lon: f64,
}

#[async_trait]
impl Tool for LocationResolver {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Get the latitude and longitude of a location from a free-text description such as a city name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location_description": {
                    "type": "string",
                    "description": "A description of a location, e.g. 'London' or 'San Francisco, CA'"
                }
            },
            "required": ["location_description"]
        })
    }

    fn returns_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lat": { "type": "number" },
                "lng": { "type": "number" }
            },
            "required": ["lat", "lng"]
        })
    }

    async fn execute(&self, args: &Value, deps: &Deps) -> Result<Payload, ToolError> {
        let description = args["location_description"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_args(NAME, "Missing 'location_description' argument"))?;
        if description.trim().is_empty() {
            return Err(ToolError::invalid_args(NAME, "'location_description' must not be empty"));
        }

        let api_key = deps
            .geo_api_key
            .as_deref()
            .ok_or_else(|| ToolError::MissingCredential {
                tool: NAME.to_string(),
                credential: "GEO_API_KEY".to_string(),
            })?;

        tracing::info!("Looking up coordinates for: {}", description);

        let (lat, lng) = self.geocode(description, api_key).await.ok_or_else(|| {
            ToolError::ModelRetry(format!("Could not find the location: {}", description))
        })?;

        let mut payload = Payload::new();
        payload.insert("lat".to_string(), json!(lat));
        payload.insert("lng".to_string(), json!(lng));

        tracing::info!(
            "Found coordinates for {}: {}",
            description,
            serde_json::Value::Object(payload.clone())
        );
        Ok(payload)
    }
}
