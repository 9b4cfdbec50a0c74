// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable queue of writes that could not reach the remote store.
//!
//! When a save happens offline, or its upload fails, the full record is
//! parked here and persisted through the [`LocalCache`]. It is drained to the
//! remote once a signed-in session is online again.
//!
//! This is NOT a history: at most one entry per [`RecordKind`] is live, since
//! a newer full record makes the older one redundant. Enqueue removes the
//! previous entry for the kind and appends the new one at the tail.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{Record, RecordKind};
use crate::storage::local_cache::LocalCache;

/// A full record awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub kind: RecordKind,
    pub payload: Record,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic position, unique per queue and never 0 once assigned
    #[serde(default)]
    pub seq: u64,
}

/// Queue state for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries currently waiting
    pub pending: usize,
    /// Entries enqueued since startup
    pub total_enqueued: u64,
    /// Entries uploaded and removed since startup
    pub total_drained: u64,
    /// Whether a drain is in progress
    pub draining: bool,
}

pub struct PendingQueue {
    cache: Arc<LocalCache>,
    entries: Mutex<Vec<QueueEntry>>,
    next_seq: AtomicU64,
    total_enqueued: AtomicU64,
    total_drained: AtomicU64,
    draining: AtomicBool,
}

impl PendingQueue {
    /// Load whatever a previous run left behind.
    pub fn load(cache: Arc<LocalCache>) -> Self {
        let mut entries = cache.load_queue();
        // Older blobs carry no seq; keep their stored order
        let mut next_seq = entries.iter().map(|e| e.seq).max().unwrap_or(0) + 1;
        for entry in entries.iter_mut().filter(|e| e.seq == 0) {
            entry.seq = next_seq;
            next_seq += 1;
        }
        entries.sort_by_key(|e| e.seq);

        if !entries.is_empty() {
            warn!(pending = entries.len(), "Pending queue has entries from previous run, will drain");
        }
        crate::metrics::set_queue_depth(entries.len());

        Self {
            cache,
            entries: Mutex::new(entries),
            next_seq: AtomicU64::new(next_seq),
            total_enqueued: AtomicU64::new(0),
            total_drained: AtomicU64::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Queue a full record, superseding any earlier entry of the same kind.
    ///
    /// An entry whose payload is strictly newer than `payload` is kept as is.
    pub fn enqueue(&self, kind: RecordKind, payload: Record) {
        let depth = {
            let mut entries = self.entries.lock();
            if entries.iter().any(|e| e.kind == kind && e.payload.is_newer_than(&payload)) {
                debug!(kind = %kind, "Queued entry is newer, older payload ignored");
                return;
            }
            let entry = QueueEntry {
                kind,
                payload,
                enqueued_at: Utc::now(),
                seq: self.next_seq.fetch_add(1, Ordering::AcqRel),
            };
            let before = entries.len();
            entries.retain(|e| e.kind != kind);
            if entries.len() < before {
                debug!(kind = %kind, "Superseded queued entry");
            }
            entries.push(entry);
            self.cache.save_queue(&entries);
            entries.len()
        };

        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_enqueue(kind.as_str());
        crate::metrics::set_queue_depth(depth);
        debug!(kind = %kind, pending = depth, "Record queued for upload");
    }

    /// Drop the entry for `kind`, if any. Returns whether one was removed.
    pub fn remove_kind(&self, kind: RecordKind) -> bool {
        self.remove_where(|e| e.kind == kind)
    }

    /// Drop the entry for `kind` once `uploaded` reached the remote, unless
    /// the queued payload is newer than what was uploaded.
    pub fn remove_settled(&self, kind: RecordKind, uploaded: &Record) -> bool {
        self.remove_where(|e| e.kind == kind && !e.payload.is_newer_than(uploaded))
    }

    fn remove_where(&self, pred: impl Fn(&QueueEntry) -> bool) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !pred(e));
        let removed = entries.len() < before;
        if removed {
            self.cache.save_queue(&entries);
            crate::metrics::set_queue_depth(entries.len());
        }
        removed
    }

    /// Snapshot in drain order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().clone()
    }

    /// Queued payload for `kind`.
    pub fn get(&self, kind: RecordKind) -> Option<QueueEntry> {
        self.entries.lock().iter().find(|e| e.kind == kind).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.is_empty()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.len(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_drained: self.total_drained.load(Ordering::Relaxed),
            draining: self.is_draining(),
        }
    }

    /// Upload queued entries strictly in order.
    ///
    /// Stops at the first failure and leaves that entry at the head. An entry
    /// is removed only once `upload` succeeded for it; if it was superseded
    /// while the upload was in flight, the newer entry stays queued and is
    /// uploaded next. Returns the number of entries drained, or `Ok(0)` when
    /// another drain is already running.
    pub async fn drain<F, Fut, E>(&self, mut upload: F) -> Result<usize, E>
    where
        F: FnMut(QueueEntry) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress");
            return Ok(0);
        };

        let pending = self.len();
        if pending == 0 {
            return Ok(0);
        }
        info!(pending, "Starting pending queue drain");

        let mut drained = 0;
        loop {
            let head = self.entries.lock().first().cloned();
            let Some(entry) = head else {
                break;
            };
            let (kind, seq) = (entry.kind, entry.seq);

            if let Err(e) = upload(entry).await {
                warn!(kind = %kind, drained, error = %e, "Queued upload failed, drain halted");
                crate::metrics::record_drain(drained, false);
                return Err(e);
            }

            if self.remove_where(|e| e.seq == seq) {
                drained += 1;
                self.total_drained.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!(kind = %kind, "Entry superseded during upload, newer entry kept");
            }
        }

        info!(drained, "Pending queue drained");
        crate::metrics::record_drain(drained, true);
        Ok(drained)
    }
}

/// RAII guard over a busy flag. Acquiring fails if the flag is already set.
pub(crate) struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
