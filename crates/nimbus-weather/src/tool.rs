//! The `get_us_weather` tool.

use async_trait::async_trait;
use serde_json::Value;

use nimbus_mcp::{CallToolResult, McpServer, ToolHandler, ToolInfo};

use crate::error::{Result, WeatherError};
use crate::model::WeatherReport;
use crate::provider::{WeatherConfig, WeatherProvider};

/// Tool name on the wire.
pub const TOOL_NAME: &str = "get_us_weather";

/// The tool's single input field.
pub const QUERY_FIELD: &str = "city_query";

/// Name the weather server announces in the handshake.
pub const SERVER_NAME: &str = "us-weather-server";

/// Current weather for a US city, as an MCP tool.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    provider: WeatherProvider,
}

impl WeatherTool {
    /// Create the tool around a provider.
    pub fn new(provider: WeatherProvider) -> Self {
        Self { provider }
    }

    /// Create the tool with its own provider.
    pub fn with_config(config: WeatherConfig) -> Result<Self> {
        Ok(Self::new(WeatherProvider::new(config)?))
    }

    /// Look up `city_query` from the call arguments.
    pub async fn lookup(&self, arguments: &Value) -> Result<WeatherReport> {
        let query = match arguments.get(QUERY_FIELD) {
            Some(Value::String(query)) => query.as_str(),
            Some(_) => {
                return Err(WeatherError::invalid_arguments(format!(
                    "argument '{QUERY_FIELD}' must be a string"
                )));
            }
            None => {
                return Err(WeatherError::invalid_arguments(format!(
                    "missing required argument '{QUERY_FIELD}'"
                )));
            }
        };

        self.provider.fetch(query).await
    }
}

#[async_trait]
impl ToolHandler for WeatherTool {
    fn info(&self) -> ToolInfo {
        ToolInfo::with_text_input(
            TOOL_NAME,
            "Get the current weather for a US city. Returns temperature in Celsius and \
             Fahrenheit, feels-like temperature, humidity, conditions, wind speed and visibility.",
            QUERY_FIELD,
            "City name, ideally \"City\" or \"City, State\" (e.g. \"San Jose, CA\" or \"New York\")",
        )
    }

    async fn call(&self, arguments: Value) -> CallToolResult {
        match self.lookup(&arguments).await {
            Ok(report) => match serde_json::to_string_pretty(&report) {
                Ok(text) => CallToolResult::success_text(text),
                Err(e) => CallToolResult::error_text(
                    WeatherError::other(&report.city, e.to_string())
                        .to_payload()
                        .to_string(),
                ),
            },
            Err(err) => {
                tracing::debug!(tool = TOOL_NAME, error = %err, "weather lookup failed");
                CallToolResult::error_text(err.to_payload().to_string())
            }
        }
    }
}

/// An MCP server hosting the weather tool.
pub fn weather_server(config: WeatherConfig) -> Result<McpServer> {
    Ok(McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))
        .with_tool(WeatherTool::with_config(config)?)
        .with_instructions(format!(
            "Call {TOOL_NAME} with {{\"{QUERY_FIELD}\": \"<city>\"}} for current US weather."
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> WeatherTool {
        WeatherTool::with_config(WeatherConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    fn payload_of(result: &CallToolResult) -> Value {
        serde_json::from_str(&result.text().unwrap()).unwrap()
    }

    #[test]
    fn test_tool_info() {
        let tool = WeatherTool::with_config(WeatherConfig::default()).unwrap();
        let info = tool.info();
        assert_eq!(info.name, "get_us_weather");
        let schema = info.input_schema.unwrap();
        assert_eq!(schema["required"][0], "city_query");
        assert_eq!(schema["properties"]["city_query"]["type"], "string");
    }

    #[test]
    fn test_weather_server_catalog() {
        let server = weather_server(WeatherConfig::default()).unwrap();
        assert_eq!(server.info().name, SERVER_NAME);
        let tools = server.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, TOOL_NAME);
    }

    #[tokio::test]
    async fn test_call_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current_condition": [{
                    "temp_C": "25",
                    "FeelsLikeC": "27",
                    "humidity": "70",
                    "weatherDesc": [{"value": "Sunny"}],
                    "windspeedKmph": "18",
                    "visibility": "10"
                }]
            })))
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .call(json!({"city_query": "Miami, FL"}))
            .await;
        assert!(!result.is_error());

        let payload = payload_of(&result);
        assert_eq!(payload["city"], "Miami, FL");
        assert_eq!(payload["temperature"]["fahrenheit"], 77.0);
        assert_eq!(payload["wind_speed_ms"], 5.0);
        assert_eq!(payload["source"], "US Weather MCP");
    }

    #[tokio::test]
    async fn test_call_not_found_is_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .call(json!({"city_query": "Nonexistent City"}))
            .await;
        assert!(result.is_error());

        let payload = payload_of(&result);
        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["error"], "Unable to find city: Nonexistent City");
    }

    #[tokio::test]
    async fn test_call_bad_arguments() {
        let server = MockServer::start().await;
        let tool = tool_for(&server);

        let result = tool.call(json!({})).await;
        assert!(result.is_error());
        let payload = payload_of(&result);
        assert!(payload["error"].as_str().unwrap().contains("city_query"));
        assert!(payload["city"].is_null());

        let result = tool.call(json!({"city_query": 42})).await;
        assert!(result.is_error());
        let payload = payload_of(&result);
        assert_eq!(payload["status"], "error");
        assert!(payload["city"].is_null());

        let result = tool.call(json!({"city_query": "  "})).await;
        assert!(result.is_error());
        assert_eq!(payload_of(&result)["status"], "error");
    }
}
