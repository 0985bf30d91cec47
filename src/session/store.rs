//! Durable single-slot storage for the bearer token. At most one token exists;
//! saving replaces any prior value. Store operations are synchronous so the
//! only suspension points in a session flow are the exchange calls.

use parking_lot::Mutex;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write token file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to remove token file {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// Client-local slot holding at most one opaque bearer token.
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, or `None` when the slot is empty or unreadable.
    fn load(&self) -> Option<String>;

    /// Replaces the stored token.
    ///
    /// # Errors
    /// Returns an error if the token could not be persisted.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Empties the slot. Clearing an empty slot succeeds.
    ///
    /// # Errors
    /// Returns an error if an existing token could not be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-process store, used by tests and embedders that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self {
            slot: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// Token persisted in a single file, readable only by the owner on unix.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/passage/token`, falling back to the working directory when
    /// the platform has no config dir.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(env!("CARGO_PKG_NAME"))
            .join("token")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, token)?;
        fs::rename(&tmp, &self.path)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!("Unreadable token file {}: {err}", self.path.display());
                None
            }
        }
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        self.write_atomic(token).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    fs::write(path, contents)
}
