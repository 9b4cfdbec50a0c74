// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use userdata_sync::SyncEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncEngineConfig::default();
//! assert_eq!(config.debounce_ms, 500);
//! assert_eq!(config.queue_key, "DHEPendingUpdates");
//!
//! // From TOML, unspecified fields keep their defaults
//! let config = SyncEngineConfig::from_toml_str(r#"
//!     debounce_ms = 250
//!     remote_url = "https://project.example.co"
//! "#).unwrap();
//! assert_eq!(config.debounce_ms, 250);
//! assert_eq!(config.remote_table, "user_data");
//! ```

use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::record::RecordKind;

/// Prefix for environment overrides (`USERDATA_SYNC_DEBOUNCE_MS`, ...).
pub const ENV_PREFIX: &str = "USERDATA_SYNC_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Configuration for the sync engine.
///
/// All fields have defaults. Remote access additionally needs `remote_url`
/// and `remote_api_key` when the PostgREST gateway is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncEngineConfig {
    /// Quiet period before a burst of writes is uploaded (default: 500 ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Directory for the file-backed local store
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Local keys of the two records and the pending queue
    #[serde(default = "default_settings_key")]
    pub settings_key: String,
    #[serde(default = "default_progress_key")]
    pub progress_key: String,
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Remote store base URL (e.g., "https://project.supabase.co")
    #[serde(default)]
    pub remote_url: Option<String>,

    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Table holding one `{user_id, settings, progress}` row per user
    #[serde(default = "default_remote_table")]
    pub remote_table: String,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_debounce_ms() -> u64 { 500 }
fn default_settings_key() -> String { "DHEIndexSettings".to_string() }
fn default_progress_key() -> String { "DHEProgress".to_string() }
fn default_queue_key() -> String { "DHEPendingUpdates".to_string() }
fn default_remote_table() -> String { "user_data".to_string() }
fn default_event_capacity() -> usize { 64 }

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            data_dir: None,
            settings_key: default_settings_key(),
            progress_key: default_progress_key(),
            queue_key: default_queue_key(),
            remote_url: None,
            remote_api_key: None,
            remote_table: default_remote_table(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncEngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `USERDATA_SYNC_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DEBOUNCE_MS") {
            self.debounce_ms = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DEBOUNCE_MS".into(),
                value,
            })?;
        }
        if let Some(value) = lookup("DATA_DIR") {
            self.data_dir = Some(value);
        }
        if let Some(value) = lookup("REMOTE_URL") {
            self.remote_url = Some(value);
        }
        if let Some(value) = lookup("REMOTE_API_KEY") {
            self.remote_api_key = Some(value);
        }
        if let Some(value) = lookup("REMOTE_TABLE") {
            self.remote_table = value;
        }
        Ok(self)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Local key holding the given record.
    #[must_use]
    pub fn key_for(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Settings => &self.settings_key,
            RecordKind::Progress => &self.progress_key,
        }
    }
}
