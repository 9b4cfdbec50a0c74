// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Debounced uploads and pending queue draining.
//!
//! Internal operations that move local records to the remote gateway. A
//! failed upload never surfaces to the caller; the record is queued and a
//! [`SyncEvent::RemoteWarning`](super::SyncEvent::RemoteWarning) is emitted.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::record::{resolve, Record, RecordKind, UserData, UserId, Winner};
use crate::resilience::pending_queue::QueueEntry;
use crate::storage::traits::RemoteError;

use super::types::PushOutcome;
use super::{DebounceSlot, SyncEngine, SyncEvent};

impl SyncEngine {
    /// (Re)start the upload timer for `kind`.
    ///
    /// Only a timer still sleeping is replaced. Once a timer fires it takes
    /// its slot out of the map before any network call, so an upload in
    /// flight is never aborted.
    pub(super) fn schedule_upload(self: &Arc<Self>, kind: RecordKind) {
        let delay = self.config.debounce();
        let generation = self.debounce_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let engine = Arc::downgrade(self);

        let mut slots = self.debounce.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            {
                let mut slots = engine.debounce.lock();
                match slots.get(&kind) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&kind);
                    }
                    // Superseded by a later save
                    _ => return,
                }
            }
            engine.upload_kind(kind).await;
        });

        if let Some(previous) = slots.insert(kind, DebounceSlot { generation, handle }) {
            previous.handle.abort();
            crate::metrics::record_debounce_coalesced(kind.as_str());
            debug!(kind = %kind, "Debounce window restarted");
        }
    }

    /// Abort every sleeping upload timer, returning the kinds they were for.
    pub(super) fn cancel_scheduled_uploads(&self) -> Vec<RecordKind> {
        let mut kinds: Vec<_> = self
            .debounce
            .lock()
            .drain()
            .map(|(kind, slot)| {
                slot.handle.abort();
                kind
            })
            .collect();
        kinds.sort();
        kinds
    }

    /// Upload the current local record of `kind`, queueing it on failure.
    #[tracing::instrument(skip(self, kind), fields(kind = %kind))]
    pub(super) async fn upload_kind(&self, kind: RecordKind) {
        let session = self.session();
        let Some(user) = session.user else {
            debug!("Signed out before upload, nothing to do");
            return;
        };

        let record = self.cache.read_record(kind);
        if !session.connectivity.is_online() {
            self.queue.enqueue(kind, record);
            crate::metrics::record_upload(kind.as_str(), "queued");
            return;
        }

        match self.push_record(&user, kind, &record).await {
            Ok(PushOutcome::Uploaded) => {
                self.queue.remove_settled(kind, &record);
                crate::metrics::record_upload(kind.as_str(), "success");
                debug!("Record uploaded");
            }
            Ok(PushOutcome::Superseded(remote)) => {
                self.queue.remove_settled(kind, &remote);
                self.adopt_if_newer(kind, &remote);
                crate::metrics::record_upload(kind.as_str(), "skipped");
            }
            Err(e) => {
                // A later save may have replaced the record during the call
                self.queue.enqueue(kind, self.cache.read_record(kind));
                crate::metrics::record_upload(kind.as_str(), "queued");
                self.remote_warning(format!("Could not upload {}: {}", kind, e));
            }
        }
    }

    /// Write `record` as the `kind` column of the user's row.
    ///
    /// The row is fetched first: the other column gets the newer of its
    /// local and remote copies, and if the remote already holds a strictly
    /// newer `kind` record nothing is written.
    pub(super) async fn push_record(
        &self,
        user: &UserId,
        kind: RecordKind,
        record: &Record,
    ) -> Result<PushOutcome, RemoteError> {
        let remote = self.gateway.fetch(user).await?;

        let remote_this = remote.get(kind);
        if remote_this.is_newer_than(record) {
            debug!(kind = %kind, "Remote holds a newer copy, upload skipped");
            return Ok(PushOutcome::Superseded(remote_this.clone()));
        }

        let other_kind = kind.other();
        let local_other = self.cache.read_record(other_kind);
        let remote_other = remote.get(other_kind);
        let other = match resolve(&local_other, remote_other) {
            Winner::Local => local_other,
            Winner::Remote => remote_other.clone(),
        };

        let mut row = UserData::default();
        row.set(kind, record.clone());
        row.set(other_kind, other);
        self.gateway.upsert(user, &row.settings, &row.progress).await?;
        Ok(PushOutcome::Uploaded)
    }

    /// Persist `remote` locally if it is strictly newer than local.
    pub(super) fn adopt_if_newer(&self, kind: RecordKind, remote: &Record) -> bool {
        let adopted = {
            let _local = self.local_write.lock();
            let newer = remote.is_newer_than(&self.cache.read_record(kind));
            if newer {
                self.cache.write_record(kind, remote);
            }
            newer
        };
        if adopted {
            crate::metrics::record_remote_adopted(kind.as_str());
            self.emit(SyncEvent::DataSynced);
        }
        adopted
    }

    /// Replay the pending queue as `user`. Returns the number drained.
    pub(super) async fn drain_queue(&self, user: &UserId) -> usize {
        if !self.queue.has_pending() {
            return 0;
        }

        match self.queue.drain(|entry| self.replay_entry(user, entry)).await {
            Ok(drained) => drained,
            Err(e) => {
                self.remote_warning(format!("Pending writes kept for later: {}", e));
                0
            }
        }
    }

    async fn replay_entry(&self, user: &UserId, entry: QueueEntry) -> Result<(), RemoteError> {
        if !self.session().connectivity.is_online() {
            return Err(RemoteError::Network("went offline".into()));
        }

        match self.push_record(user, entry.kind, &entry.payload).await? {
            PushOutcome::Uploaded => {
                info!(kind = %entry.kind, enqueued_at = %entry.enqueued_at, "Queued record uploaded");
            }
            PushOutcome::Superseded(remote) => {
                warn!(
                    kind = %entry.kind,
                    enqueued_at = %entry.enqueued_at,
                    "Queued record is older than remote, dropped"
                );
                self.adopt_if_newer(entry.kind, &remote);
            }
        }
        crate::metrics::record_upload(entry.kind.as_str(), "replayed");
        Ok(())
    }
}
