//! Command-line interface for Quarry.
//!
//! Run `quarry` to listen on the standard Graphite ports with an in-memory
//! path index.

use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{Config, QuarryError, Result};
use crate::Application;
use clap::Parser;
use std::path::PathBuf;

/// Graphite-compatible metrics intake
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port for the plaintext protocol
    #[arg(long, env = "QUARRY_PLAINTEXT_PORT")]
    pub plaintext_port: Option<u16>,

    /// Port for the pickle protocol
    #[arg(long, env = "QUARRY_PICKLE_PORT")]
    pub pickle_port: Option<u16>,

    /// Path index backend, e.g. es://localhost:9200/graphite or memory://
    #[arg(long, env = "QUARRY_INDEX_URL")]
    pub index_url: Option<String>,

    /// Maximum concurrent connections across both listeners
    #[arg(long, env = "QUARRY_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Configuration file path (default: ~/.config/quarry/config.yaml)
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "QUARRY_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join("quarry").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => builder = builder.from_yaml(&content)?,
                Err(e) if self.config.is_some() => {
                    return Err(QuarryError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(e) => {
                    tracing::debug!("Skipping config file {:?}: {}", path, e);
                },
            }
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(port) = self.plaintext_port {
            builder = builder.plaintext_port(port);
        }
        if let Some(port) = self.pickle_port {
            builder = builder.pickle_port(port);
        }
        if let Some(url) = &self.index_url {
            builder = builder.index_url(url.clone());
        }
        if let Some(max) = self.max_connections {
            builder = builder.max_connections(max);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging. `RUST_LOG` overrides the configured level.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = if self.debug {
            "debug"
        } else {
            logging.level.as_str()
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let registry = tracing_subscriber::registry().with(filter);

        let result = if logging.structured {
            registry
                .with(fmt::layer().json().with_current_span(true).with_span_list(false))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(false).compact())
                .try_init()
        };

        result.map_err(|e| QuarryError::config(format!("Failed to initialize logging: {}", e)))
    }
}

/// Execute the Quarry application.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Plaintext listener: {}", config.plaintext_addr());
        println!("  Pickle listener: {}", config.pickle_addr());
        println!("  Index backend: {}", config.index.url);
        println!("  Max connections: {}", config.server.max_connections);
        return Ok(());
    }

    cli.init_logging(&config.logging)?;
    tracing::debug!(?config, "Configuration loaded");

    Application::new(config)?.run().await
}
