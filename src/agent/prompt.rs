//! System prompt for the weather agent.

use crate::tools::ToolRegistry;

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- `{}`: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Be concise, reply with one sentence. \
Use the `get_lat_lng` tool to get the latitude and longitude of the locations, \
then use the `get_weather` tool to get the weather.

Available tools:
{tool_descriptions}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_tool() {
        let prompt = build_system_prompt(&ToolRegistry::weather_tools("http://localhost:1"));
        assert!(prompt.starts_with("Be concise, reply with one sentence."));
        assert!(prompt.contains("- `get_lat_lng`: "));
        assert!(prompt.contains("- `get_weather`: "));
    }
}
