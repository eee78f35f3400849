//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/longhaul/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/longhaul/` (~/.config/longhaul/)
//! - State/Logs: `$XDG_STATE_HOME/longhaul/` (~/.local/state/longhaul/)
//!
//! Session documents and interaction records live in directories relative to
//! the working directory unless `[server]` says otherwise.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when `llm.api_key` is not set
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP server and storage locations
    #[serde(default)]
    pub server: ServerConfig,

    /// Model API configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the API listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory holding one `{session_id}.json` per session
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,

    /// Directory holding raw model interaction records
    #[serde(default = "default_interactions_dir")]
    pub interactions_dir: PathBuf,

    /// Seconds to wait before each model call
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sessions_dir: default_sessions_dir(),
            interactions_dir: default_interactions_dir(),
            pacing_secs: default_pacing_secs(),
        }
    }
}

impl ServerConfig {
    /// Parse the bind address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid server.bind {:?}: {}", self.bind, e)))
    }

    /// Delay imposed before every model call
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("analysis_sessions")
}

fn default_interactions_dir() -> PathBuf {
    PathBuf::from("interactions")
}

fn default_pacing_secs() -> u64 {
    10
}

/// Anthropic Messages API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,
    /// API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key (falls back to `ANTHROPIC_API_KEY`)
    pub api_key: Option<String>,
    /// Upper bound on generated tokens per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP request timeout in seconds (0 disables the client timeout)
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: 0,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or the environment.
    ///
    /// A missing key is a fatal configuration error for the server.
    pub fn resolve_api_key(&self) -> Result<String> {
        pick_api_key(self.api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} environment variable is not set (or set llm.api_key)",
                    API_KEY_ENV
                ))
            })
    }

    /// Request timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// First non-blank key, config before environment.
fn pick_api_key(configured: Option<&str>, env: Option<String>) -> Option<String> {
    configured
        .filter(|key| !key.trim().is_empty())
        .map(str::to_string)
        .or_else(|| env.filter(|key| !key.trim().is_empty()))
}

fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.7
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/longhaul/config.toml` (~/.config/longhaul/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("longhaul").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/longhaul/` (~/.local/state/longhaul/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("longhaul")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/longhaul/longhaul.log` (~/.local/state/longhaul/longhaul.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("longhaul.log")
    }
}
