// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session & connectivity monitor.
//!
//! Bridges the host's two external signals, authentication changes and
//! online/offline transitions, onto the engine's transition handlers. Events
//! are applied one at a time in arrival order per channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//! use userdata_sync::{
//!     AuthEvent, Connectivity, InMemoryGateway, MemoryLocalStore, SessionMonitor,
//!     SyncEngine, SyncEngineConfig, UserId,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = SyncEngine::new(
//!     SyncEngineConfig::default(),
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(InMemoryGateway::new()),
//! );
//! let (auth_tx, auth_rx) = mpsc::channel(8);
//! let (net_tx, net_rx) = mpsc::channel(8);
//! let (_stop_tx, stop_rx) = watch::channel(false);
//!
//! let monitor = SessionMonitor::new(engine.clone(), auth_rx, net_rx);
//! let task = tokio::spawn(monitor.run(stop_rx));
//!
//! net_tx.send(Connectivity::Online).await.unwrap();
//! auth_tx.send(AuthEvent::SignedIn(UserId::from("user-1"))).await.unwrap();
//! # drop((auth_tx, net_tx));
//! # task.await.unwrap();
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::coordinator::{Connectivity, SyncEngine};
use crate::record::UserId;

/// Authentication signal from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut,
}

impl AuthEvent {
    #[must_use]
    pub fn into_user(self) -> Option<UserId> {
        match self {
            Self::SignedIn(user) => Some(user),
            Self::SignedOut => None,
        }
    }
}

impl From<Option<UserId>> for AuthEvent {
    fn from(user: Option<UserId>) -> Self {
        match user {
            Some(user) => Self::SignedIn(user),
            None => Self::SignedOut,
        }
    }
}

pub struct SessionMonitor {
    engine: Arc<SyncEngine>,
    auth_rx: mpsc::Receiver<AuthEvent>,
    net_rx: mpsc::Receiver<Connectivity>,
}

impl SessionMonitor {
    pub fn new(
        engine: Arc<SyncEngine>,
        auth_rx: mpsc::Receiver<AuthEvent>,
        net_rx: mpsc::Receiver<Connectivity>,
    ) -> Self {
        Self { engine, auth_rx, net_rx }
    }

    /// Apply events until both channels close or `shutdown` turns true.
    ///
    /// Returns the number of events applied.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!("Session monitor started");
        let mut applied = 0;
        let mut auth_open = true;
        let mut net_open = true;

        while auth_open || net_open {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Session monitor shutdown requested");
                        break;
                    }
                }

                event = self.auth_rx.recv(), if auth_open => match event {
                    Some(event) => {
                        self.engine.on_auth_change(event.into_user()).await;
                        applied += 1;
                    }
                    None => auth_open = false,
                },

                event = self.net_rx.recv(), if net_open => match event {
                    Some(connectivity) => {
                        self.engine.on_connectivity_change(connectivity).await;
                        applied += 1;
                    }
                    None => net_open = false,
                },
            }
        }

        info!(applied, "Session monitor stopped");
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncEngineConfig;
    use crate::storage::memory::{InMemoryGateway, MemoryLocalStore};

    fn engine() -> Arc<SyncEngine> {
        SyncEngine::new(
            SyncEngineConfig::default(),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(InMemoryGateway::new()),
        )
    }

    #[test]
    fn test_auth_event_from_option() {
        assert_eq!(AuthEvent::from(None), AuthEvent::SignedOut);
        let event = AuthEvent::from(Some(UserId::from("u1")));
        assert_eq!(event.into_user(), Some(UserId::from("u1")));
    }

    #[tokio::test]
    async fn test_applies_events_until_channels_close() {
        let engine = engine();
        let (auth_tx, auth_rx) = mpsc::channel(4);
        let (net_tx, net_rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = watch::channel(false);

        net_tx.send(Connectivity::Online).await.unwrap();
        auth_tx.send(AuthEvent::SignedIn(UserId::from("u1"))).await.unwrap();
        drop((auth_tx, net_tx));

        let applied = SessionMonitor::new(engine.clone(), auth_rx, net_rx).run(stop_rx).await;

        assert_eq!(applied, 2);
        let session = engine.session();
        assert_eq!(session.user, Some(UserId::from("u1")));
        assert!(session.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_loop() {
        let engine = engine();
        let (_auth_tx, auth_rx) = mpsc::channel::<AuthEvent>(4);
        let (_net_tx, net_rx) = mpsc::channel::<Connectivity>(4);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(SessionMonitor::new(engine, auth_rx, net_rx).run(stop_rx));
        stop_tx.send(true).unwrap();

        assert_eq!(task.await.unwrap(), 0);
    }
}
