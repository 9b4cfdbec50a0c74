// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] is the orchestrator that ties together:
//! - The local cache (always written first, never fails)
//! - Debounced uploads to the remote gateway
//! - The durable pending queue for writes that could not be uploaded
//! - The sign-in / reconnect merge
//!
//! # Lifecycle
//!
//! ```text
//! Created → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use userdata_sync::{
//!     Connectivity, InMemoryGateway, MemoryLocalStore, SyncEngine, SyncEngineConfig,
//! };
//! use userdata_sync::coordinator::EngineState;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = SyncEngine::new(
//!     SyncEngineConfig::default(),
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(InMemoryGateway::new()),
//! );
//! assert_eq!(engine.state(), EngineState::Created);
//!
//! engine.start(None, Connectivity::Online).await;
//! assert_eq!(engine.state(), EngineState::Running);
//! # }
//! ```

mod types;
mod api;
mod flush;
mod merge;
mod lifecycle;

pub use types::{Connectivity, EngineState, SessionState, SyncEvent};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::SyncEngineConfig;
use crate::record::RecordKind;
use crate::resilience::pending_queue::{PendingQueue, QueueEntry, QueueStats};
use crate::storage::local_cache::LocalCache;
use crate::storage::traits::{LocalStore, RemoteGateway};

/// A scheduled upload that has not fired yet.
pub(super) struct DebounceSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Offline-first sync engine for one device.
///
/// # Thread Safety
///
/// The engine is `Send + Sync` and shared as `Arc<SyncEngine>`. In-memory
/// state sits behind `parking_lot` locks that are never held across an
/// `.await`; the only suspension points are gateway calls and debounce
/// timers.
///
/// Local mutations (save, remote adoption, merge) serialize on one lock, so
/// concurrent saves on different workers never drop each other's keys.
pub struct SyncEngine {
    pub(super) config: SyncEngineConfig,

    /// Local persistence boundary (never fails)
    pub(super) cache: Arc<LocalCache>,

    /// Durable queue of records awaiting upload
    pub(super) queue: PendingQueue,

    /// Remote authoritative store
    pub(super) gateway: Arc<dyn RemoteGateway>,

    /// Session (user × connectivity), broadcast to watchers
    pub(super) session: watch::Sender<SessionState>,

    /// Engine lifecycle state
    pub(super) state: watch::Sender<EngineState>,

    /// UI notifications
    pub(super) events: broadcast::Sender<SyncEvent>,

    /// Pending debounced uploads, one per kind
    pub(super) debounce: Mutex<HashMap<RecordKind, DebounceSlot>>,
    pub(super) debounce_generation: AtomicU64,

    /// Set while a merge runs; overlapping merge requests are dropped
    pub(super) merging: AtomicBool,

    /// Held across every local read-modify-write of a record
    pub(super) local_write: Mutex<()>,

    /// Serializes auth and connectivity transitions
    pub(super) transition: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    /// Create an engine over a local store and a remote gateway.
    ///
    /// Loads the pending queue left by a previous run; nothing talks to the
    /// remote until [`start`](Self::start).
    pub fn new(
        config: SyncEngineConfig,
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let cache = Arc::new(LocalCache::new(store, &config, events.clone()));
        let queue = PendingQueue::load(cache.clone());
        let (session, _) = watch::channel(SessionState::signed_out(Connectivity::Offline));
        let (state, _) = watch::channel(EngineState::Created);

        Arc::new(Self {
            config,
            cache,
            queue,
            gateway,
            session,
            state,
            events,
            debounce: Mutex::new(HashMap::new()),
            debounce_generation: AtomicU64::new(0),
            merging: AtomicBool::new(false),
            local_write: Mutex::new(()),
            transition: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.session.borrow().clone()
    }

    #[must_use]
    pub fn session_receiver(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Subscribe to [`SyncEvent`]s. Slow receivers may miss events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Queued records in drain order.
    #[must_use]
    pub fn pending_entries(&self) -> Vec<QueueEntry> {
        self.queue.entries()
    }

    /// Whether a local storage failure was reported this session.
    #[must_use]
    pub fn storage_degraded(&self) -> bool {
        self.cache.degraded()
    }

    /// Kinds with an upload still waiting out its debounce window.
    #[must_use]
    pub fn scheduled_uploads(&self) -> Vec<RecordKind> {
        let mut kinds: Vec<_> = self.debounce.lock().keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub(super) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(super) fn remote_warning(&self, message: String) {
        warn!(%message, "Remote write deferred");
        self.emit(SyncEvent::RemoteWarning { message });
    }

    pub(super) fn set_session(&self, update: impl FnOnce(&mut SessionState)) {
        self.session.send_modify(update);
        let session = self.session.borrow();
        crate::metrics::set_session(session.is_signed_in(), session.connectivity.is_online());
    }
}
