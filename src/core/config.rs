//! Configuration management for Quarry.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI layer)
//! - Validation and defaults

use crate::core::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

/// Complete configuration for Quarry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Protocol limits
    pub ingest: IngestConfig,
    /// Path index configuration
    pub index: IndexConfig,
    /// Bundled point store configuration
    pub storage: StorageConfig,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for both listeners
    pub bind_address: IpAddr,
    /// Port for the plaintext protocol
    pub plaintext_port: u16,
    /// Port for the pickle protocol
    pub pickle_port: u16,
    /// Maximum concurrent connections across both listeners
    pub max_connections: usize,
    /// Idle read timeout per connection
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    /// How long in-flight connections may keep running after shutdown
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
}

/// Protocol limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Longest accepted plaintext token
    pub max_token_bytes: usize,
    /// Largest accepted pickle frame
    pub max_batch_bytes: usize,
}

/// Path index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Backend URL; the scheme selects the driver
    pub url: String,
    /// Upper bound for every backend call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum nodes returned by a single query
    pub max_results: usize,
    /// Attempts made to initialise the backend
    pub init_attempts: u32,
}

/// Bundled point store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Points retained per series before the oldest are dropped
    pub max_points_per_series: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Interval between intake stats log lines
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// JSON output instead of the compact text format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            ingest: IngestConfig::default(),
            index: IndexConfig::default(),
            storage: StorageConfig::default(),
            monitoring: MonitoringConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            plaintext_port: 2003,
            pickle_port: 2004,
            max_connections: 1024,
            connection_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            max_token_bytes: 64 * 1024,
            max_batch_bytes: 1024 * 1024,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            url: "memory://".to_string(),
            request_timeout: Duration::from_secs(5),
            max_results: 10_000,
            init_attempts: 3,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            max_points_per_series: 1024,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Port 0 asks the OS for a free port, so only fixed ports can clash.
        if self.server.plaintext_port != 0
            && self.server.plaintext_port == self.server.pickle_port
        {
            return Err(QuarryError::config(format!(
                "plaintext and pickle ports must be different: both set to {}",
                self.server.plaintext_port
            )));
        }

        if self.server.max_connections == 0 {
            return Err(QuarryError::config("max_connections must be greater than 0"));
        }

        if self.server.connection_timeout.is_zero() {
            return Err(QuarryError::config("connection_timeout must be greater than 0"));
        }

        if self.ingest.max_token_bytes == 0 || self.ingest.max_batch_bytes == 0 {
            return Err(QuarryError::config("ingest limits must be greater than 0"));
        }

        if self.index.request_timeout.is_zero() {
            return Err(QuarryError::config("index request_timeout must be greater than 0"));
        }

        if self.index.max_results == 0 {
            return Err(QuarryError::config("index max_results must be greater than 0"));
        }

        if self.storage.max_points_per_series == 0 {
            return Err(QuarryError::config("max_points_per_series must be greater than 0"));
        }

        self.index_url()?;

        Ok(())
    }

    /// Parsed index backend URL
    pub fn index_url(&self) -> Result<Url> {
        Url::parse(&self.index.url).map_err(|e| {
            QuarryError::config(format!("Invalid index url {:?}: {}", self.index.url, e))
        })
    }

    /// Socket address of the plaintext listener
    pub fn plaintext_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_address, self.server.plaintext_port)
    }

    /// Socket address of the pickle listener
    pub fn pickle_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_address, self.server.pickle_port)
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| QuarryError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set bind address
    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.config.server.bind_address = addr;
        self
    }

    /// Set plaintext port
    pub fn plaintext_port(mut self, port: u16) -> Self {
        self.config.server.plaintext_port = port;
        self
    }

    /// Set pickle port
    pub fn pickle_port(mut self, port: u16) -> Self {
        self.config.server.pickle_port = port;
        self
    }

    /// Set the connection cap
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.server.max_connections = max;
        self
    }

    /// Set the idle read timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.connection_timeout = timeout;
        self
    }

    /// Set the index backend URL
    pub fn index_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.index.url = url.into();
        self
    }

    /// Set the largest accepted pickle frame
    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.config.ingest.max_batch_bytes = bytes;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
