//! Runtime configuration with environment overrides, so embedders can move
//! the store directory or shorten the simulated latency without code changes.
//! Configuration values are public; do not put secrets here.

use std::path::PathBuf;
use std::time::Duration;

use crate::authority::SimulatedAuthority;
use crate::session::store::{FileStore, StoreError};
use crate::session::SessionManager;

const STORE_DIR_VAR: &str = "ACCESSO_STORE_DIR";
const LATENCY_VAR: &str = "ACCESSO_LATENCY_MS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the durable session record.
    pub store_dir: PathBuf,
    /// Simulated authority round-trip latency.
    pub latency: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let store_dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".accesso"))
            .unwrap_or_else(|| std::env::temp_dir().join("accesso"));
        Self {
            store_dir,
            latency: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Loads defaults and applies environment overrides. Empty or unparsable
    /// values are ignored rather than treated as errors.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_value(STORE_DIR_VAR) {
            config.store_dir = PathBuf::from(dir);
        }
        if let Some(millis) = env_value(LATENCY_VAR).and_then(|value| value.parse().ok()) {
            config.latency = Duration::from_millis(millis);
        }
        config
    }

    /// Wires the default stack: a file-backed store in `store_dir` and the
    /// simulated authority.
    ///
    /// # Errors
    /// Returns an error when the store directory cannot be created.
    pub fn manager(&self) -> Result<SessionManager<SimulatedAuthority, FileStore>, StoreError> {
        let store = FileStore::open(&self.store_dir)?;
        Ok(SessionManager::new(
            SimulatedAuthority::new(self.latency),
            store,
        ))
    }
}

fn env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
