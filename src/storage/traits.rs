// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{Record, UserData, UserId};

#[derive(Error, Debug)]
pub enum LocalStoreError {
    #[error("Local storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt local data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Local storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Network(String),
    #[error("Remote rejected credentials: {0}")]
    Unauthorized(String),
    #[error("Remote server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("Malformed remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Transient failures worth retrying within a single call.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::Decode(_) => false,
        }
    }
}

/// Durable client-side key/value persistence of text blobs.
///
/// Synchronous by contract: a local write has completed when `write` returns,
/// with no suspension point on the way.
pub trait LocalStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;
}

/// Remote authoritative store: one `{settings, progress}` row per user.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch the user's row. A missing row is empty records, not an error.
    async fn fetch(&self, user: &UserId) -> Result<UserData, RemoteError>;

    /// Write both records together.
    async fn upsert(&self, user: &UserId, settings: &Record, progress: &Record) -> Result<(), RemoteError>;
}
