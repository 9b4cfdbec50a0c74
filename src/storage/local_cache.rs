// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error boundary over the local store.
//!
//! Nothing raises past [`LocalCache`]: a failed read yields an empty record,
//! a failed write is kept in an in-memory shadow for the rest of the session.
//! The first failure of a session is announced once as
//! [`SyncEvent::StorageWarning`]; later ones are only logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::SyncEngineConfig;
use crate::coordinator::SyncEvent;
use crate::record::{Record, RecordKind};
use crate::resilience::pending_queue::QueueEntry;
use super::traits::{LocalStore, LocalStoreError};

pub struct LocalCache {
    store: Arc<dyn LocalStore>,
    settings_key: String,
    progress_key: String,
    queue_key: String,
    /// Blobs whose durable write failed, newest value per key
    shadow: DashMap<String, String>,
    warned: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl LocalCache {
    pub fn new(
        store: Arc<dyn LocalStore>,
        config: &SyncEngineConfig,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            store,
            settings_key: config.settings_key.clone(),
            progress_key: config.progress_key.clone(),
            queue_key: config.queue_key.clone(),
            shadow: DashMap::new(),
            warned: AtomicBool::new(false),
            events,
        }
    }

    fn key(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Settings => &self.settings_key,
            RecordKind::Progress => &self.progress_key,
        }
    }

    /// Whether a storage failure has been reported this session.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.warned.load(Ordering::Acquire)
    }

    pub fn read_record(&self, kind: RecordKind) -> Record {
        let key = self.key(kind).to_string();
        match self.read_blob(&key) {
            Some(blob) => match serde_json::from_str::<Record>(&blob) {
                Ok(record) => record,
                Err(e) => {
                    self.report("read", &key, &LocalStoreError::Serialization(e));
                    Record::new()
                }
            },
            None => Record::new(),
        }
    }

    pub fn write_record(&self, kind: RecordKind, record: &Record) {
        let key = self.key(kind).to_string();
        match serde_json::to_string(record) {
            Ok(blob) => self.write_blob(&key, blob),
            Err(e) => self.report("write", &key, &LocalStoreError::Serialization(e)),
        }
    }

    pub fn load_queue(&self) -> Vec<QueueEntry> {
        let key = self.queue_key.clone();
        match self.read_blob(&key) {
            Some(blob) => match serde_json::from_str::<Vec<QueueEntry>>(&blob) {
                Ok(entries) => entries,
                Err(e) => {
                    self.report("read", &key, &LocalStoreError::Serialization(e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    pub fn save_queue(&self, entries: &[QueueEntry]) {
        let key = self.queue_key.clone();
        match serde_json::to_string(entries) {
            Ok(blob) => self.write_blob(&key, blob),
            Err(e) => self.report("write", &key, &LocalStoreError::Serialization(e)),
        }
    }

    fn read_blob(&self, key: &str) -> Option<String> {
        if let Some(shadowed) = self.shadow.get(key) {
            return Some(shadowed.value().clone());
        }
        match self.store.read(key) {
            Ok(blob) => blob,
            Err(e) => {
                self.report("read", key, &e);
                None
            }
        }
    }

    fn write_blob(&self, key: &str, blob: String) {
        match self.store.write(key, &blob) {
            Ok(()) => {
                self.shadow.remove(key);
            }
            Err(e) => {
                self.report("write", key, &e);
                self.shadow.insert(key.to_string(), blob);
            }
        }
    }

    fn report(&self, operation: &str, key: &str, error: &LocalStoreError) {
        warn!(operation, key, error = %error, "Local storage failed, continuing in memory");
        crate::metrics::record_local_error(operation);
        if !self.warned.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(SyncEvent::StorageWarning {
                message: format!("Could not {} local data: {}", operation, error),
            });
        }
    }
}
