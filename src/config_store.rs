//! Persistence of the last used output folder
//!
//! Storage is best effort: a missing, unreadable or corrupt file loads as
//! "nothing saved", and a failed save is logged and forgotten.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trait for remembering the last output folder between runs
pub trait ConfigStore: Send + Sync {
    /// Folder saved by a previous run, if any
    fn load_last_folder(&self) -> Option<PathBuf>;

    /// Remember `folder` for the next run
    fn save_last_folder(&self, folder: &Path);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    last_folder: String,
}

/// [`ConfigStore`] backed by a small JSON file (`{"last_folder": "..."}`)
#[derive(Clone, Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Create a store that reads and writes `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> crate::Result<StoredConfig> {
        let data = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn write(&self, folder: &Path) -> crate::Result<()> {
        let stored = StoredConfig {
            last_folder: folder.to_string_lossy().into_owned(),
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(&stored)?)?;
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn load_last_folder(&self) -> Option<PathBuf> {
        if !self.path.exists() {
            return None;
        }
        match self.read() {
            Ok(stored) if !stored.last_folder.is_empty() => Some(PathBuf::from(stored.last_folder)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable folder store"
                );
                None
            }
        }
    }

    fn save_last_folder(&self, folder: &Path) {
        if let Err(e) = self.write(folder) {
            tracing::warn!(
                path = %self.path.display(),
                folder = %folder.display(),
                error = %e,
                "Failed to save last folder"
            );
        }
    }
}

/// Store that remembers nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpConfigStore;

impl ConfigStore for NoOpConfigStore {
    fn load_last_folder(&self) -> Option<PathBuf> {
        None
    }

    fn save_last_folder(&self, _folder: &Path) {}
}
