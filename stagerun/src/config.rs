//! Runner configuration.
//!
//! Every runner takes a [`RunnerConfig`]. It can be built in code, parsed
//! from JSON, or read from `STAGERUN_*` environment variables.

use crate::errors::StagerunError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable for [`RunnerConfig::continue_on_exception`].
pub const ENV_CONTINUE_ON_EXCEPTION: &str = "STAGERUN_CONTINUE_ON_EXCEPTION";
/// Environment variable for [`RunnerConfig::cancel_reason`].
pub const ENV_CANCEL_REASON: &str = "STAGERUN_CANCEL_REASON";
/// Environment variable for [`RunnerConfig::emit_events`].
pub const ENV_EMIT_EVENTS: &str = "STAGERUN_EMIT_EVENTS";
/// Environment variable for [`RunnerConfig::slow_step_warn_ms`].
pub const ENV_SLOW_STEP_WARN_MS: &str = "STAGERUN_SLOW_STEP_WARN_MS";

/// Configuration shared by all runners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Keep going after a step fails instead of stopping the run.
    #[serde(default)]
    pub continue_on_exception: bool,
    /// Reason recorded when the runner cancels on the caller's behalf.
    #[serde(default = "default_cancel_reason")]
    pub cancel_reason: String,
    /// Whether lifecycle events are published at all.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
    /// Log a warning when a single step runs longer than this.
    #[serde(default)]
    pub slow_step_warn_ms: Option<u64>,
}

fn default_cancel_reason() -> String {
    "cancellation requested".to_string()
}

fn default_emit_events() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            continue_on_exception: false,
            cancel_reason: default_cancel_reason(),
            emit_events: default_emit_events(),
            slow_step_warn_ms: None,
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the continue-on-exception policy.
    #[must_use]
    pub fn with_continue_on_exception(mut self, continue_on_exception: bool) -> Self {
        self.continue_on_exception = continue_on_exception;
        self
    }

    /// Sets the cancel reason.
    #[must_use]
    pub fn with_cancel_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancel_reason = reason.into();
        self
    }

    /// Enables or disables event publishing.
    #[must_use]
    pub fn with_emit_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// Sets the slow step threshold.
    #[must_use]
    pub fn with_slow_step_warn_ms(mut self, millis: u64) -> Self {
        self.slow_step_warn_ms = Some(millis);
        self
    }

    /// Returns the slow step threshold as a `Duration`.
    #[must_use]
    pub fn slow_step_threshold(&self) -> Option<Duration> {
        self.slow_step_warn_ms.map(Duration::from_millis)
    }

    /// Parses a configuration from JSON; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::Config`] if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, StagerunError> {
        serde_json::from_str(json).map_err(|e| StagerunError::Config(e.to_string()))
    }

    /// Reads a configuration from `STAGERUN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, StagerunError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::Config`] if a value is unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StagerunError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_CONTINUE_ON_EXCEPTION) {
            config.continue_on_exception = parse_bool(ENV_CONTINUE_ON_EXCEPTION, &value)?;
        }
        if let Some(value) = lookup(ENV_CANCEL_REASON) {
            config.cancel_reason = value;
        }
        if let Some(value) = lookup(ENV_EMIT_EVENTS) {
            config.emit_events = parse_bool(ENV_EMIT_EVENTS, &value)?;
        }
        if let Some(value) = lookup(ENV_SLOW_STEP_WARN_MS) {
            let millis = value.trim().parse::<u64>().map_err(|e| {
                StagerunError::Config(format!("{ENV_SLOW_STEP_WARN_MS}={value}: {e}"))
            })?;
            config.slow_step_warn_ms = Some(millis);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, StagerunError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(StagerunError::Config(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}
