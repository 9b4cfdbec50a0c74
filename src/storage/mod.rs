// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`traits`]: The [`LocalStore`](traits::LocalStore) and
//!   [`RemoteGateway`](traits::RemoteGateway) seams
//! - [`local_cache`]: Error boundary over a local store
//! - [`memory`]: In-memory local store and gateway (tests, ephemeral sessions)
//! - [`file`]: Durable file-per-key local store
//! - [`postgrest`]: HTTP gateway for a PostgREST `user_data` table

pub mod traits;
pub mod local_cache;
pub mod memory;
pub mod file;
pub mod postgrest;
