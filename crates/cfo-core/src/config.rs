use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::policy::GuardrailPolicy;

/// Top-level configuration loaded from `~/.ai-cfo/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub guardrails: GuardrailPolicy,
}

impl Config {
    /// Load config from `~/.ai-cfo/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.history.validate()?;
        self.guardrails.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ai-cfo")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_service_name() -> String {
    "ai-cfo".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock budget for one fan-out batch.
    #[serde(default = "default_batch_deadline_ms")]
    pub batch_deadline_ms: u64,
    /// Artificial handler latency, to exercise the concurrent fan-out.
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_deadline_ms: default_batch_deadline_ms(),
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_deadline_ms == 0 {
            return Err(ConfigError::Validation(
                "scheduler.batch_deadline_ms must be greater than zero".into(),
            ));
        }
        if self.simulated_latency_ms >= self.batch_deadline_ms {
            return Err(ConfigError::Validation(format!(
                "scheduler.simulated_latency_ms ({}) must be below batch_deadline_ms ({})",
                self.simulated_latency_ms, self.batch_deadline_ms
            )));
        }
        Ok(())
    }
}

fn default_batch_deadline_ms() -> u64 {
    30_000
}
fn default_simulated_latency_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Records kept in the in-process history log; the oldest go first.
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

impl HistoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Validation(
                "history.capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_history_capacity() -> usize {
    10_000
}
