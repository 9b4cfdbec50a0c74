// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record data model.
//!
//! A [`Record`] is a free-form JSON mapping that always carries the reserved
//! `_meta.lastSaved` timestamp. Conflicts between two copies of the same
//! record are resolved wholesale by that timestamp (last-write-wins).
//!
//! # Example
//!
//! ```
//! use userdata_sync::{Record, record::{resolve, Winner}};
//! use serde_json::json;
//!
//! let local = Record::from_json(json!({"theme": "dark", "_meta": {"lastSaved": "2024-01-01T00:00:00Z"}}));
//! let remote = Record::from_json(json!({"theme": "light", "_meta": {"lastSaved": "2024-06-01T00:00:00Z"}}));
//!
//! assert!(remote.is_newer_than(&local));
//! assert_eq!(resolve(&local, &remote), Winner::Remote);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Reserved metadata key inside every record.
pub const META_KEY: &str = "_meta";
/// Timestamp field inside [`META_KEY`].
pub const LAST_SAVED_KEY: &str = "lastSaved";

/// The two logical records kept per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Settings,
    Progress,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Settings, RecordKind::Progress];

    /// The record stored alongside this one in the remote row.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Settings => Self::Progress,
            Self::Progress => Self::Settings,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Progress => "progress",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A settings or progress record.
///
/// Serializes as the bare JSON object, so the on-disk blob and the remote
/// column hold exactly what the UI wrote plus `_meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from a JSON value. Anything but an object yields an
    /// empty record.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Raw `_meta.lastSaved` string, if present.
    pub fn last_saved_raw(&self) -> Option<&str> {
        self.0
            .get(META_KEY)
            .and_then(|meta| meta.get(LAST_SAVED_KEY))
            .and_then(Value::as_str)
    }

    /// Parsed `_meta.lastSaved`. Missing or unparseable timestamps are the
    /// Unix epoch, so such a record loses every comparison.
    #[must_use]
    pub fn last_saved(&self) -> DateTime<Utc> {
        self.last_saved_raw()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// Whether this record carries a real save timestamp.
    #[must_use]
    pub fn has_timestamp(&self) -> bool {
        self.last_saved() > DateTime::<Utc>::default()
    }

    /// Strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.last_saved() > other.last_saved()
    }

    /// Set `_meta.lastSaved`, keeping any other `_meta` fields.
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        let stamp = Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        match self.0.get_mut(META_KEY) {
            Some(Value::Object(meta)) => {
                meta.insert(LAST_SAVED_KEY.to_string(), stamp);
            }
            _ => {
                let mut meta = Map::new();
                meta.insert(LAST_SAVED_KEY.to_string(), stamp);
                self.0.insert(META_KEY.to_string(), Value::Object(meta));
            }
        }
    }

    /// Shallow merge: every top-level key of `partial` overwrites ours.
    pub fn merge_from(&mut self, partial: Record) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    /// Same content, ignoring `_meta`.
    #[must_use]
    pub fn same_content(&self, other: &Record) -> bool {
        let strip = |r: &Record| {
            r.0.iter()
                .filter(|(k, _)| k.as_str() != META_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>()
        };
        strip(self) == strip(other)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Side chosen by last-write-wins resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Whole-record LWW. Remote must be strictly newer to win; ties keep local.
#[must_use]
pub fn resolve(local: &Record, remote: &Record) -> Winner {
    if remote.is_newer_than(local) {
        Winner::Remote
    } else {
        Winner::Local
    }
}

/// The remote row shape: both records of one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub settings: Record,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub progress: Record,
}

// Remote columns may be SQL NULL for a freshly created row
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Record, D::Error> {
    Ok(Option::<Record>::deserialize(deserializer)?.unwrap_or_default())
}

impl UserData {
    pub fn new(settings: Record, progress: Record) -> Self {
        Self { settings, progress }
    }

    pub fn get(&self, kind: RecordKind) -> &Record {
        match kind {
            RecordKind::Settings => &self.settings,
            RecordKind::Progress => &self.progress,
        }
    }

    pub fn set(&mut self, kind: RecordKind, record: Record) {
        match kind {
            RecordKind::Settings => self.settings = record,
            RecordKind::Progress => self.progress = record,
        }
    }
}
