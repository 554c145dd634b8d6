//! Weather lookup at a pair of coordinates.
//!
//! Answers from a fixed table of observations; no weather service is contacted.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{f64_arg, Deps, Payload, Tool, ToolError};

const NAME: &str = "get_weather";

/// Observations keyed by exact (lat, lng).
const OBSERVATIONS: &[(f64, f64, i64, &str)] = &[
    (10.79532, -55.393958, 70, "Snowing"),
    (37.7749, -122.4194, 100, "Windy"),
];

/// Get the weather at a location.
pub struct WeatherLookup;

#[async_trait]
impl Tool for WeatherLookup {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Get the weather at a location given its latitude and longitude. Use get_lat_lng first to obtain the coordinates."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lat": {
                    "type": "number",
                    "description": "The latitude of the location"
                },
                "lng": {
                    "type": "number",
                    "description": "The longitude of the location"
                }
            },
            "required": ["lat", "lng"]
        })
    }

    fn returns_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "temp": { "type": "integer" },
                "description": { "type": "string" }
            },
            "required": ["temp", "description"]
        })
    }

    async fn execute(&self, args: &Value, deps: &Deps) -> Result<Payload, ToolError> {
        let lat = f64_arg(NAME, args, "lat")?;
        let lng = f64_arg(NAME, args, "lng")?;

        lookup(lat, lng, deps)
    }
}

fn lookup(lat: f64, lng: f64, deps: &Deps) -> Result<Payload, ToolError> {
    if lat == 0.0 && lng == 0.0 {
        return Err(ToolError::ModelRetry("Could not find the location".to_string()));
    }

    tracing::info!(
        has_api_key = deps.weather_api_key.is_some(),
        "Getting weather for coordinates: lat={}, lng={}",
        lat,
        lng
    );

    let (_, _, temp, description) = OBSERVATIONS
        .iter()
        .find(|(la, ln, _, _)| *la == lat && *ln == lng)
        .ok_or_else(|| {
            ToolError::ModelRetry(format!(
                "Could not find weather for coordinates: lat={}, lng={}",
                lat, lng
            ))
        })?;

    let mut payload = Payload::new();
    payload.insert("temp".to_string(), json!(temp));
    payload.insert("description".to_string(), json!(description));

    tracing::info!("Weather at coordinates: {}", serde_json::Value::Object(payload.clone()));
    Ok(payload)
}
