//! Configuration module for the echo test server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the echo server
#[derive(Parser, Debug, Default)]
#[command(name = "netclient-echo-server")]
#[command(version)]
#[command(
    about = "Echo test server with deflate renegotiation and server-side disconnect",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:65000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Serve sessions concurrently instead of one at a time
    #[arg(long)]
    pub concurrent: bool,

    /// Maximum sessions running at once in concurrent mode
    #[arg(short = 'm', long)]
    pub max_sessions: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Serve sessions concurrently
    #[serde(default)]
    pub concurrent: bool,
    /// Concurrent session cap
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            concurrent: false,
            max_sessions: default_max_sessions(),
            backlog: default_backlog(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:65000".to_string()
}

fn default_max_sessions() -> usize {
    1024
}

fn default_backlog() -> i32 {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Each session runs to completion before the next accept.
    Serial,
    /// Each session runs on its own task.
    Concurrent,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub mode: SessionMode,
    pub max_sessions: usize,
    pub backlog: i32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let concurrent = cli.concurrent || toml_config.server.concurrent;

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            mode: if concurrent {
                SessionMode::Concurrent
            } else {
                SessionMode::Serial
            },
            max_sessions: cli
                .max_sessions
                .unwrap_or(toml_config.server.max_sessions)
                .max(1),
            backlog: toml_config.server.backlog.max(1),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
