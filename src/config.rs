use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SpxError};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Application configuration loaded from a TOML file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and proxy credentials
    pub common: CommonConfig,
    /// Forwarding behaviour
    pub proxy: ProxyConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommonConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port for the proxy server (default: 8080)
    pub port: u16,
    /// Proxy authentication username, empty disables auth
    pub username: String,
    /// Proxy authentication password, empty disables auth
    pub password: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Parent proxies used for plain HTTP requests, in rotation order
    pub parent_proxies: Vec<String>,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Upstream round-trip timeout in seconds, unset means unbounded
    pub request_timeout: Option<u64>,
    /// Idle lifetime of pooled upstream connections in seconds
    pub pool_idle_timeout: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            parent_proxies: Vec::new(),
            connect_timeout: 10,
            request_timeout: None,
            pool_idle_timeout: 90,
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// Returns `Ok(None)` when the file does not exist so callers can fall
    /// back to defaults.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_str(&content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Override file values with command-line flags
    pub fn apply_overrides(&mut self, port: Option<u16>) {
        if let Some(port) = port {
            self.common.port = port;
        }
    }

    /// Whether proxy authentication is configured
    pub fn auth_enabled(&self) -> bool {
        !self.common.username.is_empty() && !self.common.password.is_empty()
    }

    /// Get the proxy server address
    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.common.host, self.common.port)
    }

    fn validate(&self) -> Result<()> {
        if self.proxy.connect_timeout == 0 {
            return Err(SpxError::InvalidConfig(
                "proxy.connect_timeout must be at least 1 second".into(),
            ));
        }
        if self.proxy.request_timeout == Some(0) {
            return Err(SpxError::InvalidConfig(
                "proxy.request_timeout must be at least 1 second when set".into(),
            ));
        }
        match self.log.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(SpxError::InvalidConfig(format!(
                "log.format must be json or pretty, got {}",
                other
            ))),
        }
    }
}
