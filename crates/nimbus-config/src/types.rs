//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nimbus_mcp::{Framing, McpServerConfig, SessionConfig};
use nimbus_weather::WeatherConfig;

use crate::error::{ConfigError, Result};

/// Subcommand the default server command is launched with.
pub const SERVE_SUBCOMMAND: &str = "serve";

/// Default name of the weather server connection.
pub const DEFAULT_SERVER_NAME: &str = "us-weather";

/// Root configuration.
///
/// Every section is optional so that a layer only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NimbusConfig {
    /// Session timeouts and framing.
    pub session: Option<SessionSection>,
    /// The server process to connect to.
    pub server: Option<ServerSection>,
    /// Weather provider settings, used by `nimbus serve`.
    pub weather: Option<WeatherSection>,
    /// Log output.
    pub logging: Option<LoggingSection>,
}

impl NimbusConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: NimbusConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.server.is_some() {
            self.server = other.server;
        }

        if other.weather.is_some() {
            self.weather = other.weather;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Config with every section filled in, for display.
    pub fn effective(&self) -> Self {
        Self {
            session: Some(self.session()),
            server: Some(self.server()),
            weather: Some(self.weather()),
            logging: Some(self.logging()),
        }
    }

    /// The `[session]` section or its defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// The `[server]` section or its defaults.
    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    /// The `[weather]` section or its defaults.
    pub fn weather(&self) -> WeatherSection {
        self.weather.clone().unwrap_or_default()
    }

    /// The `[logging]` section or its defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Resolve the session settings.
    pub fn session_config(&self) -> Result<SessionConfig> {
        self.session().to_session_config()
    }

    /// Resolve the server connection, including its session settings.
    pub fn server_config(&self) -> Result<McpServerConfig> {
        Ok(self
            .server()
            .to_server_config()?
            .with_session(self.session_config()?))
    }

    /// Resolve the weather provider settings.
    pub fn weather_config(&self) -> Result<WeatherConfig> {
        self.weather().to_weather_config()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session configuration section.
///
/// ```toml
/// [session]
/// handshake_timeout_secs = 10
/// request_timeout_secs = 15
/// framing = "newline"          # or "content-length"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Bound on the handshake, in seconds.
    pub handshake_timeout_secs: u64,
    /// Bound on each request, in seconds.
    pub request_timeout_secs: u64,
    /// Framing on the spawned server's stdio.
    pub framing: Framing,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: nimbus_mcp::DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            request_timeout_secs: nimbus_mcp::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            framing: Framing::default(),
        }
    }
}

impl SessionSection {
    /// Convert to runtime session settings.
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig::default()
            .with_handshake_timeout(positive_secs(
                "session.handshake_timeout_secs",
                self.handshake_timeout_secs,
            )?)
            .with_request_timeout(positive_secs(
                "session.request_timeout_secs",
                self.request_timeout_secs,
            )?)
            .with_framing(self.framing))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The weather server to spawn.
///
/// Without a `command`, the running `nimbus` binary is launched with `serve`.
///
/// ```toml
/// [server]
/// name = "us-weather"
/// command = "/usr/local/bin/nimbus"
/// args = ["serve"]
/// env = [["RUST_LOG", "debug"]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Connection name, used in adapter namespacing.
    pub name: String,
    /// Command to execute.
    pub command: Option<String>,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set (as [key, value] pairs).
    pub env: Vec<[String; 2]>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            command: None,
            args: Vec::new(),
            env: Vec::new(),
        }
    }
}

impl ServerSection {
    /// Command and arguments to launch.
    pub fn command_line(&self) -> Result<(String, Vec<String>)> {
        match &self.command {
            Some(command) if command.trim().is_empty() => {
                Err(ConfigError::invalid("server.command", "must not be empty"))
            }
            Some(command) => Ok((command.clone(), self.args.clone())),
            None => {
                let exe = std::env::current_exe().map_err(|e| {
                    ConfigError::Other(format!("cannot locate the nimbus executable: {e}"))
                })?;
                let mut args = vec![SERVE_SUBCOMMAND.to_string()];
                args.extend(self.args.iter().cloned());
                Ok((exe.display().to_string(), args))
            }
        }
    }

    /// Convert to a server connection with default session settings.
    pub fn to_server_config(&self) -> Result<McpServerConfig> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("server.name", "must not be empty"));
        }

        let (command, args) = self.command_line()?;
        let mut config = McpServerConfig::new(&self.name, command).with_args(args);
        for [key, value] in &self.env {
            config = config.with_env_var(key, value);
        }
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Weather Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Weather provider section.
///
/// ```toml
/// [weather]
/// base_url = "https://wttr.in"
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSection {
    /// Provider base URL.
    pub base_url: String,
    /// Bound on one provider request, in seconds.
    pub timeout_secs: u64,
    /// Override for the User-Agent header.
    pub user_agent: Option<String>,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            base_url: nimbus_weather::provider::DEFAULT_BASE_URL.to_string(),
            timeout_secs: nimbus_weather::provider::DEFAULT_TIMEOUT.as_secs(),
            user_agent: None,
        }
    }
}

impl WeatherSection {
    /// Convert to runtime provider settings.
    pub fn to_weather_config(&self) -> Result<WeatherConfig> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "weather.base_url",
                format!("'{}' is not an http(s) URL", self.base_url),
            ));
        }

        let mut config = WeatherConfig {
            base_url: self.base_url.clone(),
            timeout: positive_secs("weather.timeout_secs", self.timeout_secs)?,
            ..Default::default()
        };
        if let Some(ref agent) = self.user_agent {
            config.user_agent = agent.clone();
        }
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base filter directive for the console (`RUST_LOG` wins when set).
    pub level: String,
    /// Whether the JSON log file is written.
    pub file: bool,
    /// Directory for log files. Defaults to `logs/` under the config dir.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            dir: None,
        }
    }
}

fn positive_secs(field: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NimbusConfig::from_toml("").unwrap();
        assert!(config.session.is_none());

        let session = config.session_config().unwrap();
        assert_eq!(session.handshake_timeout, Duration::from_secs(10));
        assert_eq!(session.request_timeout, Duration::from_secs(15));
        assert_eq!(session.framing, Framing::NewlineDelimited);

        let weather = config.weather_config().unwrap();
        assert_eq!(weather.base_url, "https://wttr.in");
        assert_eq!(weather.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full_config() {
        let config = NimbusConfig::from_toml(
            r#"
[session]
handshake_timeout_secs = 3
request_timeout_secs = 30
framing = "content-length"

[server]
name = "weather"
command = "/opt/nimbus/bin/nimbus"
args = ["serve", "--verbose"]
env = [["RUST_LOG", "debug"]]

[weather]
base_url = "http://localhost:9000"
timeout_secs = 4
user_agent = "test-agent"

[logging]
level = "debug"
file = false
"#,
        )
        .unwrap();

        let server = config.server_config().unwrap();
        assert_eq!(server.name, "weather");
        assert_eq!(server.command, "/opt/nimbus/bin/nimbus");
        assert_eq!(server.args, vec!["serve", "--verbose"]);
        assert_eq!(server.env, vec![("RUST_LOG".to_string(), "debug".to_string())]);
        assert_eq!(server.session.handshake_timeout, Duration::from_secs(3));
        assert_eq!(server.session.framing, Framing::ContentLength);

        let weather = config.weather_config().unwrap();
        assert_eq!(weather.base_url, "http://localhost:9000");
        assert_eq!(weather.timeout, Duration::from_secs(4));
        assert_eq!(weather.user_agent, "test-agent");

        let logging = config.logging();
        assert_eq!(logging.level, "debug");
        assert!(!logging.file);
    }

    #[test]
    fn test_framing_aliases() {
        let config = NimbusConfig::from_toml("[session]\nframing = \"newline\"\n").unwrap();
        assert_eq!(config.session().framing, Framing::NewlineDelimited);

        let config =
            NimbusConfig::from_toml("[session]\nframing = \"newline-delimited\"\n").unwrap();
        assert_eq!(config.session().framing, Framing::NewlineDelimited);

        assert!(NimbusConfig::from_toml("[session]\nframing = \"carrier-pigeon\"\n").is_err());
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = NimbusConfig::from_toml("[session]\nrequest_timeout_secs = 60\n").unwrap();
        let session = config.session();
        assert_eq!(session.request_timeout_secs, 60);
        assert_eq!(session.handshake_timeout_secs, 10);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = NimbusConfig::from_toml("[session]\nrequest_timeout_secs = 0\n").unwrap();
        let err = config.session_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "session.request_timeout_secs"));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config = NimbusConfig::from_toml("[weather]\nbase_url = \"wttr.in\"\n").unwrap();
        assert!(config.weather_config().is_err());
    }

    #[test]
    fn test_default_server_command_is_self_serve() {
        let server = NimbusConfig::new().server_config().unwrap();
        assert_eq!(server.name, DEFAULT_SERVER_NAME);
        assert_eq!(server.args, vec![SERVE_SUBCOMMAND]);
        assert!(!server.command.is_empty());
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = NimbusConfig::from_toml("[server]\ncommand = \" \"\n").unwrap();
        assert!(config.server_config().is_err());
    }

    #[test]
    fn test_merge_replaces_named_sections_only() {
        let mut base = NimbusConfig::from_toml(
            r#"
[session]
request_timeout_secs = 20

[weather]
timeout_secs = 5
"#,
        )
        .unwrap();
        let overlay = NimbusConfig::from_toml("[weather]\ntimeout_secs = 8\n").unwrap();

        base.merge(overlay);
        assert_eq!(base.session().request_timeout_secs, 20);
        assert_eq!(base.weather().timeout_secs, 8);
    }

    #[test]
    fn test_effective_roundtrips_through_toml() {
        let effective = NimbusConfig::new().effective();
        let text = effective.to_toml().unwrap();
        assert!(text.contains("[session]"));
        assert!(text.contains("request_timeout_secs = 15"));

        let parsed = NimbusConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.session(), effective.session());
        assert_eq!(parsed.weather(), effective.weather());
    }
}
