//! US weather lookup for Nimbus.
//!
//! [`WeatherTool`] is the `get_us_weather` capability: it queries a
//! wttr.in-compatible provider, converts units into a [`WeatherReport`] and
//! answers with a tool result. Lookup failures (unknown city, provider down,
//! garbled payload) come back as tool results with `isError` set, so a caller's
//! session is never disturbed by them.
//!
//! ```rust,ignore
//! use nimbus_mcp::McpTransport;
//! use nimbus_weather::{WeatherConfig, weather_server};
//!
//! weather_server(WeatherConfig::default())?
//!     .serve(McpTransport::stdio(Default::default()))
//!     .await?;
//! ```

pub mod error;
pub mod model;
pub mod provider;
pub mod tool;

pub use error::{Result, WeatherError};
pub use model::{
    SOURCE_TAG, TIMESTAMP_FORMAT, Temperature, WeatherReport, celsius_to_fahrenheit, kmh_to_ms,
};
pub use provider::{WeatherConfig, WeatherProvider, normalize_query};
pub use tool::{QUERY_FIELD, SERVER_NAME, TOOL_NAME, WeatherTool, weather_server};
