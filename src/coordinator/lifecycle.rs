// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: start, session transitions, shutdown.
//!
//! Transitions are serialized: a sign-out arriving while a sign-in merge is
//! still running waits for it to finish.

use tracing::{debug, info, warn};

use crate::record::{RecordKind, UserId};

use super::{Connectivity, EngineState, SyncEngine};

impl SyncEngine {
    /// Start the engine with the session observed at startup.
    ///
    /// Startup flow:
    /// 1. Publish the initial session
    /// 2. If signed in and online, merge with the remote
    /// 3. Drain whatever the previous run left in the pending queue
    #[tracing::instrument(skip(self, user, connectivity), fields(user = ?user, connectivity = %connectivity))]
    pub async fn start(&self, user: Option<UserId>, connectivity: Connectivity) {
        let _transition = self.transition.lock().await;
        self.state.send_replace(EngineState::Starting);
        self.set_session(|s| {
            s.user = user.clone();
            s.connectivity = connectivity;
        });

        let pending = self.queue.len();
        info!(pending, "Starting sync engine");

        if let Some(user) = self.session().active_user().cloned() {
            self.reconcile(&user).await;
        } else if pending > 0 {
            debug!(pending, "Queued writes wait for a signed-in online session");
        }

        self.state.send_replace(EngineState::Running);
        info!("Sync engine running");
    }

    /// Apply an authentication change (`None` = signed out).
    ///
    /// Switching directly between two users is a sign-out of the first
    /// followed by a sign-in of the second.
    #[tracing::instrument(skip(self, user), fields(user = ?user))]
    pub async fn on_auth_change(&self, user: Option<UserId>) {
        let _transition = self.transition.lock().await;
        let current = self.session().user;
        if current == user {
            return;
        }

        if let Some(previous) = current {
            self.sign_out(&previous).await;
        }
        if let Some(next) = user {
            self.sign_in(next).await;
        }
    }

    /// Apply a connectivity change.
    ///
    /// Coming back online while signed in merges first, then replays the
    /// queue, so queued writes never clobber a newer remote edit.
    #[tracing::instrument(skip(self, connectivity), fields(connectivity = %connectivity))]
    pub async fn on_connectivity_change(&self, connectivity: Connectivity) {
        let _transition = self.transition.lock().await;
        if self.session().connectivity == connectivity {
            return;
        }
        self.set_session(|s| s.connectivity = connectivity);

        match connectivity {
            Connectivity::Online => {
                info!("Connectivity restored");
                if let Some(user) = self.session().user {
                    self.reconcile(&user).await;
                }
            }
            Connectivity::Offline => info!("Connectivity lost, writes will be queued"),
        }
    }

    /// Merge and drain now, if a signed-in session is online.
    pub async fn sync_now(&self) -> bool {
        match self.session().active_user().cloned() {
            Some(user) => self.reconcile(&user).await,
            None => false,
        }
    }

    /// Stop all remote activity.
    ///
    /// Uploads still waiting out their debounce window are attempted now,
    /// or queued when that is not possible, so no write is left behind.
    pub async fn shutdown(&self) {
        let _transition = self.transition.lock().await;
        self.state.send_replace(EngineState::ShuttingDown);
        info!("Shutting down sync engine");

        for kind in self.cancel_scheduled_uploads() {
            self.upload_kind(kind).await;
        }

        let stats = self.queue.stats();
        if stats.pending > 0 {
            warn!(pending = stats.pending, "Shutting down with queued writes, they will drain next session");
        }
        self.state.send_replace(EngineState::Stopped);
        info!(
            enqueued = stats.total_enqueued,
            drained = stats.total_drained,
            "Sync engine stopped"
        );
    }

    async fn sign_in(&self, user: UserId) {
        info!(user = %user, "Signed in");
        self.set_session(|s| s.user = Some(user.clone()));

        if self.session().connectivity.is_online() {
            self.reconcile(&user).await;
        } else {
            // Offline: park local data so it reaches the new session later
            for kind in RecordKind::ALL {
                let record = self.cache.read_record(kind);
                if !record.is_empty() {
                    self.queue.enqueue(kind, record);
                }
            }
        }
    }

    async fn sign_out(&self, user: &UserId) {
        info!(user = %user, "Signing out, flushing pending writes");

        for kind in self.cancel_scheduled_uploads() {
            let record = self.cache.read_record(kind);
            if !record.is_empty() {
                self.queue.enqueue(kind, record);
            }
        }

        if self.session().connectivity.is_online() {
            let drained = self.drain_queue(user).await;
            debug!(drained, "Sign-out flush done");
        }

        self.set_session(|s| s.user = None);
    }

    /// Freshness-then-replay: merge with the remote, then drain the queue.
    async fn reconcile(&self, user: &UserId) -> bool {
        let converged = self.merge_with_remote(user).await;
        self.drain_queue(user).await;
        converged && self.queue.is_empty()
    }
}
