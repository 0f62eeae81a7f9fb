//! Configuration loading, validation, and management for Longhaul.
//!
//! Loads configuration from `~/.longhaul/config.toml` with environment
//! variable overrides. Validates all settings at load time so the runtime
//! only ever sees consistent values.

use longhaul_core::{CompactionConfig, ReactConfig, RetryConfig, StrategyKind, TokenizerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.longhaul/config.toml`:
///
/// ```toml
/// [compaction]
/// strategy = "hybrid"
/// trigger_threshold_tokens = 100000
/// target_tokens = 80000
///
/// [react]
/// model = "gpt-4o"
/// max_iterations = 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// When and how the context is compacted
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Token counting
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Reasoning loop behavior
    #[serde(default)]
    pub react: ReactConfig,

    /// Backoff for transient model errors
    #[serde(default)]
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Load configuration from the default path (~/.longhaul/config.toml).
    ///
    /// Environment variables override file values:
    /// - `LONGHAUL_MODEL`
    /// - `LONGHAUL_COMPACTION_STRATEGY`
    /// - `LONGHAUL_TRIGGER_TOKENS`
    /// - `LONGHAUL_TARGET_TOKENS`
    /// - `LONGHAUL_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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
        tracing::debug!(
            path = %path.display(),
            strategy = %config.compaction.strategy,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load()`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("LONGHAUL_MODEL") {
            self.react.model = model;
        }

        if let Some(strategy) = lookup("LONGHAUL_COMPACTION_STRATEGY") {
            self.compaction.strategy = strategy
                .parse::<StrategyKind>()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        if let Some(value) = lookup("LONGHAUL_TRIGGER_TOKENS") {
            self.compaction.trigger_threshold_tokens = parse_env("LONGHAUL_TRIGGER_TOKENS", &value)?;
        }

        if let Some(value) = lookup("LONGHAUL_TARGET_TOKENS") {
            self.compaction.target_tokens = parse_env("LONGHAUL_TARGET_TOKENS", &value)?;
        }

        if let Some(value) = lookup("LONGHAUL_MAX_ITERATIONS") {
            self.react.max_iterations = parse_env("LONGHAUL_MAX_ITERATIONS", &value)?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".longhaul")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let validation = |e: longhaul_core::Error| ConfigError::ValidationError(e.to_string());

        self.compaction.validate().map_err(validation)?;
        self.tokenizer.validate().map_err(validation)?;
        self.react.validate().map_err(validation)?;
        self.retry.validate().map_err(validation)?;

        if self.react.temperature < 0.0 || self.react.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "react.temperature must be between 0.0 and 2.0".into(),
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'"))
    })
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
