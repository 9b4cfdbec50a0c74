// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory backends.
//!
//! [`MemoryLocalStore`] stands in for durable client storage and
//! [`InMemoryGateway`] for the remote store, so the engine can be driven
//! deterministically without a disk or a network.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::record::{Record, UserData, UserId};
use super::traits::{LocalStore, LocalStoreError, RemoteError, RemoteGateway};

pub struct MemoryLocalStore {
    data: DashMap<String, String>,
    /// Reject writes, as a browser does once its storage quota is exhausted
    read_only: AtomicBool,
}

impl MemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            read_only: AtomicBool::new(false),
        }
    }

    /// Get current key count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw blob stored under `key`
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|r| r.value().clone())
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryLocalStore {
    fn read(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(LocalStoreError::Unavailable("quota exceeded".into()));
        }
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Gateway backed by a map of rows, with switches for failure injection.
pub struct InMemoryGateway {
    rows: DashMap<UserId, UserData>,
    fetch_count: AtomicU64,
    upsert_count: AtomicU64,
    /// Every accepted upsert, in order
    upsert_log: Mutex<Vec<(UserId, UserData)>>,
    offline: AtomicBool,
    fail_fetches: AtomicBool,
    fail_upserts: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            fetch_count: AtomicU64::new(0),
            upsert_count: AtomicU64::new(0),
            upsert_log: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fail_upserts: AtomicBool::new(false),
            fetch_delay: Mutex::new(None),
        }
    }

    /// Put a row in place without counting it as an upsert.
    pub fn seed(&self, user: &UserId, data: UserData) {
        self.rows.insert(user.clone(), data);
    }

    pub fn row(&self, user: &UserId) -> Option<UserData> {
        self.rows.get(user).map(|r| r.value().clone())
    }

    /// Fetches attempted, including failed ones
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Acquire)
    }

    /// Upserts attempted, including failed ones
    pub fn upsert_count(&self) -> u64 {
        self.upsert_count.load(Ordering::Acquire)
    }

    pub fn upserts(&self) -> Vec<(UserId, UserData)> {
        self.upsert_log.lock().clone()
    }

    /// Fail every call with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::Release);
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::Release);
    }

    /// Delay fetch responses. The row is read before the delay, so a slow
    /// response carries whatever the remote held when the request was made.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock() = delay;
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(RemoteError::Network("gateway offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn fetch(&self, user: &UserId) -> Result<UserData, RemoteError> {
        self.fetch_count.fetch_add(1, Ordering::AcqRel);
        self.check_reachable()?;
        if self.fail_fetches.load(Ordering::Acquire) {
            return Err(RemoteError::Server { status: 503, body: "fetch failed".into() });
        }

        let snapshot = self.row(user).unwrap_or_default();
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn upsert(&self, user: &UserId, settings: &Record, progress: &Record) -> Result<(), RemoteError> {
        self.upsert_count.fetch_add(1, Ordering::AcqRel);
        self.check_reachable()?;
        if self.fail_upserts.load(Ordering::Acquire) {
            return Err(RemoteError::Server { status: 503, body: "upsert failed".into() });
        }

        let data = UserData::new(settings.clone(), progress.clone());
        self.rows.insert(user.clone(), data.clone());
        self.upsert_log.lock().push((user.clone(), data));
        Ok(())
    }
}
