// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durability and retry.
//!
//! - [`pending_queue`]: Durable queue of writes not yet confirmed remotely
//! - [`retry`]: Exponential backoff for gateway calls

pub mod pending_queue;
pub mod retry;
