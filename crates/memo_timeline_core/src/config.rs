//! Engine configuration.
//!
//! # Responsibility
//! - Load the JSON engine configuration with per-key defaults.
//! - Reject values that would make scans or views meaningless.
//!
//! # Invariants
//! - A missing config file means defaults, not an error.
//! - Unknown keys are ignored so older engines accept newer files.

use crate::model::memo::{DisplayConfig, DEFAULT_MAX_DISPLAY_MEMOS};
use crate::store::DEFAULT_MEMO_FIELD;
use crate::timeline::scanner::{ScanOptions, DEFAULT_SCAN_BATCH_SIZE};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::Path;

/// What a mutation does when the field changed since it was read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Write unconditionally; the last writer's log is kept.
    #[default]
    LastWriteWins,
    /// Re-read before writing and fail with a conflict on any difference.
    Detect,
}

/// Tunables of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_display_memos: usize,
    pub memo_field: String,
    pub scan_batch_size: usize,
    pub conflict_policy: ConflictPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_display_memos: DEFAULT_MAX_DISPLAY_MEMOS,
            memo_field: DEFAULT_MEMO_FIELD.to_string(),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Configuration load/validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A value parsed but is out of range.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Json(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document; absent keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    "event=config_load module=config status=skipped reason=missing path={}",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let config = Self::from_json_str(&raw).inspect_err(|err| {
            warn!(
                "event=config_load module=config status=error path={} error={err}",
                path.display()
            );
        })?;
        info!(
            "event=config_load module=config status=ok max_display_memos={} scan_batch_size={} conflict_policy={:?}",
            config.max_display_memos, config.scan_batch_size, config.conflict_policy
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_display_memos == 0 {
            return Err(ConfigError::Invalid(
                "max_display_memos must be positive".to_string(),
            ));
        }
        if self.memo_field.trim().is_empty() {
            return Err(ConfigError::Invalid("memo_field cannot be empty".to_string()));
        }
        if self.scan_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "scan_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn display(&self) -> DisplayConfig {
        DisplayConfig {
            max_display_memos: self.max_display_memos,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            batch_size: self.scan_batch_size,
            ..ScanOptions::new(self.memo_field.clone())
        }
    }
}
