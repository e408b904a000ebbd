//! File system paths for the session client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".marketplace";

/// Manages file system paths for the session client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client files (~/.marketplace)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.marketplace`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or(CoreError::NoHomeDir)?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.marketplace).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.marketplace/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the durable key/value storage directory (~/.marketplace/storage).
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("storage")
    }

    /// Ensure the base and storage directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        for dir in [self.base_dir.clone(), self.storage_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| CoreError::CreateDir { path: dir, source })?;
        }
        Ok(())
    }
}
