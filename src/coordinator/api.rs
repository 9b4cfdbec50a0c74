// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Consumer API: read and write the two records.
//!
//! Every operation resolves, whatever the network or the disk does:
//! - `get_*` returns the freshest copy it can see, degrading to local
//! - `save_*` persists locally before returning, then schedules the upload

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, warn};

use crate::record::{Record, RecordKind};

use super::{Connectivity, EngineState, SyncEngine};

impl SyncEngine {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Record access
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn get_settings(&self) -> Record {
        self.get_record(RecordKind::Settings).await
    }

    pub async fn get_progress(&self) -> Record {
        self.get_record(RecordKind::Progress).await
    }

    pub async fn save_settings(self: &Arc<Self>, partial: Record) {
        self.save_record(RecordKind::Settings, partial).await;
    }

    pub async fn save_progress(self: &Arc<Self>, partial: Record) {
        self.save_record(RecordKind::Progress, partial).await;
    }

    /// Read a record, preferring a strictly newer remote copy.
    ///
    /// Signed in and online, the remote row is fetched and compared against
    /// local by `_meta.lastSaved`; a newer remote copy is persisted locally
    /// and returned. Otherwise, or if the fetch fails, local is returned.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use userdata_sync::{SyncEngine, RecordKind};
    /// # async fn example(engine: &SyncEngine) {
    /// let progress = engine.get_record(RecordKind::Progress).await;
    /// if progress.get("lesson-3").is_some() {
    ///     println!("lesson 3 visited");
    /// }
    /// # }
    /// ```
    #[tracing::instrument(skip(self, kind), fields(kind = %kind))]
    pub async fn get_record(&self, kind: RecordKind) -> Record {
        let Some(user) = self.session().active_user().cloned() else {
            return self.cache.read_record(kind);
        };

        let remote = match self.gateway.fetch(&user).await {
            Ok(row) => row.get(kind).clone(),
            Err(e) => {
                warn!(error = %e, "Fetch failed, serving local copy");
                return self.cache.read_record(kind);
            }
        };

        // A write may have landed while the fetch was in flight
        let _local = self.local_write.lock();
        let local = self.cache.read_record(kind);
        if remote.is_newer_than(&local) && self.session().user.as_ref() == Some(&user) {
            debug!(
                local = ?local.last_saved_raw(),
                remote = ?remote.last_saved_raw(),
                "Remote copy is newer, adopting"
            );
            self.cache.write_record(kind, &remote);
            crate::metrics::record_remote_adopted(kind.as_str());
            return remote;
        }
        local
    }

    /// Merge `partial` into the local record and schedule its upload.
    ///
    /// The merged, stamped record is persisted before this returns. Then:
    /// - signed out: nothing else happens
    /// - signed in, offline: the record is queued right away
    /// - signed in, online: a debounced upload is (re)scheduled
    ///
    /// Once shutdown has begun the save stays local; the next session's
    /// merge picks it up as the newer copy.
    #[tracing::instrument(skip(self, kind, partial), fields(kind = %kind, keys = partial.len()))]
    pub async fn save_record(self: &Arc<Self>, kind: RecordKind, partial: Record) {
        let record = {
            let _local = self.local_write.lock();
            let mut record = self.cache.read_record(kind);
            record.merge_from(partial);
            record.stamp(Utc::now());
            self.cache.write_record(kind, &record);
            record
        };

        if matches!(self.state(), EngineState::ShuttingDown | EngineState::Stopped) {
            debug!("Engine stopped, saved locally only");
            return;
        }

        let session = self.session();
        match (&session.user, session.connectivity) {
            (None, _) => debug!("Signed out, saved locally only"),
            (Some(_), Connectivity::Offline) => self.queue.enqueue(kind, record),
            (Some(_), Connectivity::Online) => self.schedule_upload(kind),
        }
    }
}
