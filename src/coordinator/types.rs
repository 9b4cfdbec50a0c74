// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync engine coordinator.

use crate::record::{Record, RecordKind, UserId, Winner};

/// Engine lifecycle state.
///
/// Use [`super::SyncEngine::state()`] to check current state or
/// [`super::SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Reconciling with the remote during start
    Starting,
    /// Serving reads and writes
    Running,
    /// Flushing pending uploads
    ShuttingDown,
    /// Timers cancelled, no further remote activity
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Who is signed in, and whether the remote is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserId>,
    pub connectivity: Connectivity,
}

impl SessionState {
    #[must_use]
    pub fn signed_out(connectivity: Connectivity) -> Self {
        Self { user: None, connectivity }
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// The user to talk to the remote as, if signed in and online.
    #[must_use]
    pub fn active_user(&self) -> Option<&UserId> {
        if self.connectivity.is_online() {
            self.user.as_ref()
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user {
            Some(user) => write!(f, "SignedIn({}), {}", user, self.connectivity),
            None => write!(f, "SignedOut, {}", self.connectivity),
        }
    }
}

/// Notifications for dependent UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Local records were reconciled with the remote; re-read them
    DataSynced,
    /// Local storage failed; the session continues in memory
    StorageWarning { message: String },
    /// A remote write failed and was queued for later
    RemoteWarning { message: String },
    /// A merge kept one whole record and dropped a differing one
    MergeDegraded {
        kind: RecordKind,
        kept: Winner,
        discarded: Record,
    },
}

/// Result of pushing one record to the remote (internal use)
#[derive(Debug, Clone, PartialEq)]
pub(super) enum PushOutcome {
    /// Row written with this record
    Uploaded,
    /// The remote already held a newer copy, which is returned
    Superseded(Record),
}
