//! Engine tuning knobs.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! { "tickIntervalMs": 60000, "clockToleranceMs": 300000,
//!   "historyMaxEntries": 1000, "historyMaxAgeMs": 604800000,
//!   "defaultRetry": { "maxAttempts": 3, "backoffMs": 1000 } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Period of the scheduler tick that evaluates clock triggers.
    pub tick_interval_ms: u64,
    /// How long after a clock trigger's instant it may still fire.
    pub clock_tolerance_ms: u64,
    /// Execution History keeps at most this many records.
    pub history_max_entries: usize,
    /// Execution History drops records older than this.
    pub history_max_age_ms: u64,
    /// Applied to workflows that declare no `retryPolicy`.
    pub default_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            clock_tolerance_ms: 5 * 60_000,
            history_max_entries: 1_000,
            history_max_age_ms: 7 * 24 * 60 * 60_000,
            default_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject values that would stall the tick loop or make the history
    /// useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.tick_interval_ms == 0 {
            problems.push("tickIntervalMs must be greater than zero");
        }
        if self.clock_tolerance_ms == 0 {
            problems.push("clockToleranceMs must be greater than zero");
        }
        if self.history_max_entries == 0 {
            problems.push("historyMaxEntries must be greater than zero");
        }
        if self.history_max_age_ms == 0 {
            problems.push("historyMaxAgeMs must be greater than zero");
        }
        if self.default_retry.max_attempts == 0 {
            problems.push("defaultRetry.maxAttempts must be at least 1");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn clock_tolerance(&self) -> Duration {
        Duration::from_millis(self.clock_tolerance_ms)
    }

    pub fn history_max_age(&self) -> Duration {
        Duration::from_millis(self.history_max_age_ms)
    }
}
