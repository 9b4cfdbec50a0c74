// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # User Data Sync
//!
//! An offline-first sync engine for a user's two records, **settings** and
//! **lesson progress**, kept in a durable local cache and reconciled with a
//! remote store whenever a signed-in session and connectivity allow it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Consumer API                          │
//! │  • get_settings / save_settings / get_progress / ...        │
//! │  • Never fails: degrades to local data                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Local Cache                            │
//! │  • Synchronous, durable (file or memory backend)            │
//! │  • Errors swallowed with a one-shot warning                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                (debounced upload / pending queue)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Remote Gateway                          │
//! │  • One {settings, progress} row per user                    │
//! │  • Whole-record last-write-wins on `_meta.lastSaved`        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use userdata_sync::{
//!     Connectivity, InMemoryGateway, MemoryLocalStore, Record, SyncEngine,
//!     SyncEngineConfig, UserId,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = SyncEngine::new(
//!         SyncEngineConfig::default(),
//!         Arc::new(MemoryLocalStore::new()),
//!         Arc::new(InMemoryGateway::new()),
//!     );
//!     engine.start(Some(UserId::from("user-1")), Connectivity::Online).await;
//!
//!     engine.save_settings(Record::from_json(json!({"theme": "dark"}))).await;
//!     let settings = engine.get_settings().await;
//!     assert_eq!(settings.get("theme"), Some(&json!("dark")));
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncEngine`] orchestrating reads, writes and merges
//! - [`storage`]: Local store backends and remote gateways
//! - [`resilience`]: Pending write queue and retry logic
//! - [`monitor`]: Session & connectivity event loop
//! - [`record`]: Records, kinds and `_meta.lastSaved` handling

pub mod config;
pub mod record;
pub mod storage;
pub mod resilience;
pub mod coordinator;
pub mod monitor;
pub mod metrics;

pub use config::{SyncEngineConfig, ConfigError};
pub use record::{Record, RecordKind, UserData, UserId};
pub use coordinator::{SyncEngine, Connectivity, EngineState, SessionState, SyncEvent};
pub use monitor::{SessionMonitor, AuthEvent};
pub use storage::traits::{LocalStore, RemoteGateway, LocalStoreError, RemoteError};
pub use storage::memory::{MemoryLocalStore, InMemoryGateway};
pub use storage::file::FileLocalStore;
pub use storage::postgrest::PostgrestGateway;
pub use storage::local_cache::LocalCache;
pub use resilience::pending_queue::{PendingQueue, QueueEntry, QueueStats};
pub use resilience::retry::RetryConfig;
