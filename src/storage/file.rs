// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File-backed local store.
//!
//! Each key is one `<key>.json` file inside the data directory. Writes go to
//! a temporary file in the same directory which is then atomically renamed
//! over the target, so a crash mid-write leaves the previous blob intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::SyncEngineConfig;
use super::traits::{LocalStore, LocalStoreError};

pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LocalStoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!(path = %dir.display(), "Opened file-backed local store");
        Ok(Self { dir })
    }

    /// Open the store at `config.data_dir`.
    pub fn from_config(config: &SyncEngineConfig) -> Result<Self, LocalStoreError> {
        let dir = config
            .data_dir
            .as_deref()
            .ok_or_else(|| LocalStoreError::Unavailable("no data_dir configured".into()))?;
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, LocalStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(LocalStoreError::Unavailable(format!("invalid key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl LocalStore for FileLocalStore {
    fn read(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        let path = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| LocalStoreError::Io(e.error))?;
        debug!(key, bytes = value.len(), "Local blob written");
        Ok(())
    }
}
