//! HTTP client for a wttr.in-compatible weather provider.

use std::time::Duration;

use reqwest::Client;

use crate::error::{Result, WeatherError};
use crate::model::{ProviderResponse, TIMESTAMP_FORMAT, WeatherReport};

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://wttr.in";

/// Default bound on a single provider request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the weather provider.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// Provider base URL, without a trailing path.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("Nimbus/", env!("CARGO_PKG_VERSION"), " (US Weather MCP)")
                .to_string(),
        }
    }
}

/// Turn a free-text city query into a URL path segment.
///
/// Words are percent-encoded individually and joined with `+`. Returns `None`
/// for a blank query.
pub fn normalize_query(query: &str) -> Option<String> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join("+"))
    }
}

/// Client for current conditions.
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Client,
    config: WeatherConfig,
}

impl WeatherProvider {
    /// Create a provider with custom configuration.
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(WeatherError::Client)?;

        Ok(Self { client, config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    /// Request URL for a query.
    pub fn url_for(&self, query: &str) -> Result<String> {
        let path = normalize_query(query)
            .ok_or_else(|| WeatherError::other(query, "city query must not be empty"))?;
        Ok(format!(
            "{}/{}?format=j1",
            self.config.base_url.trim_end_matches('/'),
            path
        ))
    }

    /// Fetch current conditions for `query`.
    ///
    /// One bounded request; no retries.
    pub async fn fetch(&self, query: &str) -> Result<WeatherReport> {
        let url = self.url_for(query)?;
        tracing::debug!(city = %query, url = %url, "fetching weather");

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!(city = %query, error = %e, "weather request failed");
            WeatherError::other(query, request_error_message(&e))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::info!(city = %query, status = status.as_u16(), "weather provider rejected query");
            return Err(WeatherError::not_found(query));
        }

        let body = response.text().await.map_err(|e| {
            WeatherError::other(query, format!("failed to read provider response: {e}"))
        })?;

        let payload: ProviderResponse = serde_json::from_str(&body).map_err(|e| {
            WeatherError::other(query, format!("malformed provider response: {e}"))
        })?;

        let current = payload.current_condition.first().ok_or_else(|| {
            WeatherError::other(query, "provider response has no current conditions")
        })?;

        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let report = WeatherReport::from_current(query, current, timestamp)
            .map_err(|msg| WeatherError::other(query, format!("malformed provider response: {msg}")))?;

        tracing::debug!(
            city = %query,
            celsius = report.temperature.celsius,
            condition = %report.condition,
            "weather fetched"
        );
        Ok(report)
    }
}

fn request_error_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("weather provider timed out: {err}")
    } else if err.is_connect() {
        format!("could not reach weather provider: {err}")
    } else {
        format!("weather request failed: {err}")
    }
}
