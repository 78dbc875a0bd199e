//! Durable session persistence. The store is a two-key namespace holding an
//! opaque session token and the serialized identity. Invariant: both keys are
//! present or both are absent: `load` repairs a half-written record by
//! clearing it, and `save` clears on partial failure rather than leaving one
//! half behind.

use crate::session::state::Identity;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, warn};

const TOKEN_KEY: &str = "auth_token";
const IDENTITY_KEY: &str = "user_data";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The durable counterpart of an authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedRecord {
    pub token: String,
    pub identity: Identity,
}

/// Durable key-value persistence for the current session. Accessed only by
/// the session manager; `save` and `clear` are critical sections with respect
/// to the both-or-neither record invariant.
pub trait SessionStore {
    /// Reads the remembered session, treating a half-written or unreadable
    /// record as absent and clearing it as a side effect.
    ///
    /// # Errors
    /// Returns an error when the medium itself fails, not when the record is
    /// merely corrupt.
    fn load(&self) -> Result<Option<PersistedRecord>, StoreError>;

    /// Writes both halves of the record, or neither.
    ///
    /// # Errors
    /// On partial failure the namespace is cleared before the error returns.
    fn save(&self, record: &PersistedRecord) -> Result<(), StoreError>;

    /// Removes both keys. Clearing an already-empty namespace is a no-op.
    ///
    /// # Errors
    /// Returns an error when the medium fails to remove an existing key.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Applies the both-or-neither invariant to whatever the medium returned.
/// `None` means the record must be discarded by the caller.
fn assemble(token: Option<String>, identity_raw: Option<String>) -> Option<PersistedRecord> {
    let token = token?;
    let raw = identity_raw?;
    match serde_json::from_str(&raw) {
        Ok(identity) => Some(PersistedRecord { token, identity }),
        Err(err) => {
            warn!("Discarding unreadable session record: {err}");
            None
        }
    }
}

/// File-backed store: one file per key under a dedicated directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates, if needed) the store directory.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn read_key(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.dir.join(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<PersistedRecord>, StoreError> {
        let token = self.read_key(TOKEN_KEY)?;
        let identity_raw = self.read_key(IDENTITY_KEY)?;
        if token.is_none() && identity_raw.is_none() {
            return Ok(None);
        }
        match assemble(token, identity_raw) {
            Some(record) => Ok(Some(record)),
            None => {
                warn!("Repairing half-written session record");
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn save(&self, record: &PersistedRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&record.identity)?;
        fs::write(self.dir.join(TOKEN_KEY), &record.token)?;
        if let Err(err) = fs::write(self.dir.join(IDENTITY_KEY), serialized) {
            // Token landed but the identity did not: roll back to empty.
            // Logged here so a failing rollback cannot swallow the cause.
            error!("Failed to write session identity: {err}");
            self.clear()?;
            return Err(err.into());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.remove_key(TOKEN_KEY)?;
        self.remove_key(IDENTITY_KEY)?;
        Ok(())
    }
}

/// In-memory store with the same contract, for tests and embedders without a
/// durable medium. Does not survive process restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a single key, bypassing the record invariant. Test hook for
    /// constructing half-written records.
    pub fn put_raw(&self, key: &'static str, value: &str) {
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .insert(key, value.to_string());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .is_empty()
    }
}

/// Key name for the session token half, exposed for raw test writes.
pub const RAW_TOKEN_KEY: &str = TOKEN_KEY;
/// Key name for the identity half, exposed for raw test writes.
pub const RAW_IDENTITY_KEY: &str = IDENTITY_KEY;

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedRecord>, StoreError> {
        let (token, identity_raw) = {
            let entries = self.entries.lock().expect("session store lock poisoned");
            (
                entries.get(TOKEN_KEY).cloned(),
                entries.get(IDENTITY_KEY).cloned(),
            )
        };
        if token.is_none() && identity_raw.is_none() {
            return Ok(None);
        }
        match assemble(token, identity_raw) {
            Some(record) => Ok(Some(record)),
            None => {
                warn!("Repairing half-written session record");
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn save(&self, record: &PersistedRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&record.identity)?;
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        entries.insert(TOKEN_KEY, record.token.clone());
        entries.insert(IDENTITY_KEY, serialized);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .clear();
        Ok(())
    }
}
