//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The retry budget of the agent loop is deliberately absent: it is a policy
//! constant of the agent crate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for agent replies
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Edit-context pruning settings
    #[serde(default)]
    pub edit: EditSettings,

    /// Recorded-reply provider settings
    #[serde(default)]
    pub replay: ReplayConfig,
}

fn default_model() -> String {
    "replay".into()
}
fn default_temperature() -> f32 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Tokens kept free for the model's reply; the prompt budget is the
    /// context length minus this reserve.
    #[serde(default = "default_reply_reserve")]
    pub reply_reserve_tokens: usize,
}

fn default_reply_reserve() -> usize {
    512
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            reply_reserve_tokens: default_reply_reserve(),
        }
    }
}

/// How much of the file the initial edit instruction may quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSettings {
    /// Tokens set aside for tool guidance blocks.
    #[serde(default = "default_function_buffer")]
    pub function_buffer_tokens: usize,

    /// Share of the context window reserved for the rest of the
    /// conversation (declared range, quoted code, replacement code).
    #[serde(default = "default_reserve_ratio")]
    pub reserve_ratio: f32,
}

fn default_function_buffer() -> usize {
    400
}
fn default_reserve_ratio() -> f32 {
    0.8
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            function_buffer_tokens: default_function_buffer(),
            reserve_ratio: default_reserve_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Characters per streamed chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Context window the replayed model pretends to have
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

fn default_chunk_size() -> usize {
    16
}
fn default_context_length() -> usize {
    4096
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            context_length: default_context_length(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_TEMPERATURE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("STEPWISE_MODEL") {
            config.default_model = model;
        }

        if let Ok(raw) = std::env::var("STEPWISE_TEMPERATURE") {
            config.default_temperature = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "STEPWISE_TEMPERATURE must be a number, got \"{raw}\""
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..1.0).contains(&self.edit.reserve_ratio) {
            return Err(ConfigError::ValidationError(
                "edit.reserve_ratio must be in [0.0, 1.0)".into(),
            ));
        }

        if self.replay.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "replay.chunk_size must be > 0".into(),
            ));
        }

        if self.replay.context_length == 0 {
            return Err(ConfigError::ValidationError(
                "replay.context_length must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_temperature: default_temperature(),
            agent: AgentSettings::default(),
            edit: EditSettings::default(),
            replay: ReplayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
