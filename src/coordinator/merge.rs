// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sign-in and reconnect merge.
//!
//! Both kinds are resolved by whole-record last-write-wins on
//! `_meta.lastSaved`. Concurrent edits to different keys of the same record
//! on two devices do not both survive; the losing copy is reported through
//! [`SyncEvent::MergeDegraded`].

use tracing::{debug, info, warn};

use crate::record::{resolve, Record, RecordKind, UserData, UserId, Winner};
use crate::resilience::pending_queue::DrainGuard;

use super::{SyncEngine, SyncEvent};

impl SyncEngine {
    /// Converge local and remote for `user`.
    ///
    /// A merge already running makes this return immediately. Returns
    /// whether both sides were confirmed equal at the end.
    #[tracing::instrument(skip(self, user), fields(user = %user))]
    pub(super) async fn merge_with_remote(&self, user: &UserId) -> bool {
        let Some(_guard) = DrainGuard::acquire(&self.merging) else {
            debug!("Merge already in flight, request coalesced");
            crate::metrics::record_merge("coalesced");
            return false;
        };

        let online = self.session().connectivity.is_online();
        let remote = if online {
            match self.gateway.fetch(user).await {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(error = %e, "Fetch failed during merge, treating remote as empty");
                    None
                }
            }
        } else {
            None
        };

        let mut canonical = UserData::default();
        for kind in RecordKind::ALL {
            // Re-read after the fetch so a write made meanwhile is not lost
            let _local = self.local_write.lock();
            let local = self.cache.read_record(kind);
            let chosen = match remote.as_ref().map(|row| row.get(kind)) {
                Some(remote_rec) => self.resolve_kind(kind, local, remote_rec),
                None => local,
            };
            canonical.set(kind, chosen);
        }

        let needs_upload = match &remote {
            Some(row) => *row != canonical,
            // Fetch failed: local is canonical, unless there is nothing to send
            None => online && !(canonical.settings.is_empty() && canonical.progress.is_empty()),
        };

        let converged = if needs_upload {
            match self.gateway.upsert(user, &canonical.settings, &canonical.progress).await {
                Ok(()) => true,
                Err(e) => {
                    self.remote_warning(format!("Could not upload merged data: {}", e));
                    false
                }
            }
        } else if remote.is_some() {
            debug!("Local and remote already agree");
            true
        } else {
            false
        };

        if converged {
            for kind in RecordKind::ALL {
                self.queue.remove_settled(kind, canonical.get(kind));
            }
            crate::metrics::record_merge("uploaded");
            info!("Merge complete");
        } else {
            for kind in RecordKind::ALL {
                let record = canonical.get(kind);
                if !record.is_empty() {
                    self.queue.enqueue(kind, record.clone());
                }
            }
            crate::metrics::record_merge("queued");
            info!(pending = self.queue.len(), "Merge kept local data, upload queued");
        }

        self.emit(SyncEvent::DataSynced);
        converged
    }

    /// Pick the canonical copy of one kind and persist it if remote won.
    fn resolve_kind(&self, kind: RecordKind, local: Record, remote: &Record) -> Record {
        match resolve(&local, remote) {
            Winner::Remote => {
                self.cache.write_record(kind, remote);
                self.report_discard(kind, Winner::Remote, remote, local);
                remote.clone()
            }
            Winner::Local => {
                self.report_discard(kind, Winner::Local, &local, remote.clone());
                local
            }
        }
    }

    fn report_discard(&self, kind: RecordKind, kept: Winner, kept_record: &Record, discarded: Record) {
        if discarded.is_empty() || !discarded.has_timestamp() || kept_record.same_content(&discarded) {
            return;
        }
        info!(
            kind = %kind,
            kept = %kept,
            discarded_saved = ?discarded.last_saved_raw(),
            "Whole-record merge dropped a differing copy"
        );
        crate::metrics::record_merge_degraded(kind.as_str());
        self.emit(SyncEvent::MergeDegraded { kind, kept, discarded });
    }
}
