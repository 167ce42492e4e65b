//! Persistence of the saved transfer setup
//!
//! The transfer core never reads the setup file itself; callers hand it a
//! [`ConfigStore`] and load descriptors through that.

use crate::config::TransferDescriptor;
use crate::error::{IoResultExt, Result, TransferError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Loader/saver pair for the saved transfer setup
pub trait ConfigStore {
    /// Load the saved descriptor, `None` if nothing has been saved
    fn load(&self) -> Result<Option<TransferDescriptor>>;

    /// Save a descriptor, replacing any previous one
    fn save(&self, descriptor: &TransferDescriptor) -> Result<()>;

    /// Remove the saved descriptor; returns whether one existed
    fn reset(&self) -> Result<bool>;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.jarvis/file_transfer.json`
    pub fn default_location() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| TransferError::config("HOME environment variable not set"))?;

        Ok(PathBuf::from(home).join(".jarvis").join("file_transfer.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<TransferDescriptor>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TransferError::io(&self.path, e)),
        };

        let descriptor: TransferDescriptor = serde_json::from_str(&raw).map_err(|e| {
            TransferError::config(format!("{}: {}", self.path.display(), e))
        })?;
        descriptor.validate()?;

        Ok(Some(descriptor))
    }

    fn save(&self, descriptor: &TransferDescriptor) -> Result<()> {
        descriptor.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        let json = serde_json::to_string_pretty(descriptor)?;
        std::fs::write(&self.path, json).with_path(&self.path)?;

        // The file holds a password
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_path(&self.path)?;
        }

        tracing::debug!("Saved transfer setup to {}", self.path.display());
        Ok(())
    }

    fn reset(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TransferError::io(&self.path, e)),
        }
    }
}

/// In-memory store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<TransferDescriptor>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<TransferDescriptor>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| TransferError::config("config store lock poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, descriptor: &TransferDescriptor) -> Result<()> {
        descriptor.validate()?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| TransferError::config("config store lock poisoned"))?;
        *slot = Some(descriptor.clone());
        Ok(())
    }

    fn reset(&self) -> Result<bool> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| TransferError::config("config store lock poisoned"))?;
        Ok(slot.take().is_some())
    }
}
