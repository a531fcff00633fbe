//! Credential Store
//!
//! Durable key-value persistence for the access and refresh credentials.
//! Values are opaque strings; either key may be absent.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroize;

use crate::identity::CredentialPair;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported session file version: {0}")]
    UnsupportedVersion(u32),
}

/// Persisted credential slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    Access,
    Refresh,
}

impl CredentialKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::Access => "access_token",
            CredentialKey::Refresh => "refresh_token",
        }
    }
}

/// Durable credential persistence.
///
/// Implementations must survive process restarts. The provided methods
/// build the pair-level contract on top of the per-key primitives.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError>;

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError>;

    /// Remove every stored credential
    fn clear(&self) -> Result<(), StoreError>;

    /// Persist a full credential pair
    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.set(CredentialKey::Access, &pair.access_token)?;
        self.set(CredentialKey::Refresh, &pair.refresh_token)
    }

    /// Load the pair, `None` unless both halves are present
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        let access = self.get(CredentialKey::Access)?;
        let refresh = self.get(CredentialKey::Refresh)?;
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        })
    }

    fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.get(CredentialKey::Access)
    }

    fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.get(CredentialKey::Refresh)
    }
}

/// On-disk file format
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default)]
    saved_at: i64,
}

const SESSION_FILE_VERSION: u32 = 1;

impl SessionFile {
    fn slot(&mut self, key: CredentialKey) -> &mut Option<String> {
        match key {
            CredentialKey::Access => &mut self.access_token,
            CredentialKey::Refresh => &mut self.refresh_token,
        }
    }

    fn wipe(&mut self) {
        for key in [CredentialKey::Access, CredentialKey::Refresh] {
            if let Some(mut value) = self.slot(key).take() {
                value.zeroize();
            }
        }
    }
}

/// JSON file store, written atomically through a temp file
pub struct FileCredentialStore {
    path: PathBuf,
    cached: Mutex<SessionFile>,
}

impl FileCredentialStore {
    /// Open (or lazily create) the session file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let cached = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let file: SessionFile = serde_json::from_str(&data)?;
            if file.version != SESSION_FILE_VERSION {
                return Err(StoreError::UnsupportedVersion(file.version));
            }
            file
        } else {
            SessionFile {
                version: SESSION_FILE_VERSION,
                ..Default::default()
            }
        };

        Ok(Self {
            path,
            cached: Mutex::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, file: &mut SessionFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        file.saved_at = Utc::now().timestamp();
        let data = serde_json::to_string_pretty(&*file)?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp = std::fs::File::create(&temp_path)?;
            temp.write_all(data.as_bytes())?;
            temp.sync_all()?;
        }
        std::fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), "Session file written");
        Ok(())
    }

    /// Apply `update` to a copy, write it, and only then replace the cached file
    fn commit(&self, update: impl FnOnce(&mut SessionFile)) -> Result<(), StoreError> {
        let mut cached = self.cached.lock();
        let mut next = cached.clone();
        update(&mut next);

        if let Err(e) = self.persist(&mut next) {
            next.wipe();
            return Err(e);
        }

        let mut previous = std::mem::replace(&mut *cached, next);
        previous.wipe();
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        Ok(self.cached.lock().slot(key).clone())
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        self.commit(|file| {
            *file.slot(key) = Some(value.to_string());
        })
    }

    /// Both halves land in a single write
    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.commit(|file| {
            *file.slot(CredentialKey::Access) = Some(pair.access_token.clone());
            *file.slot(CredentialKey::Refresh) = Some(pair.refresh_token.clone());
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut file = self.cached.lock();
        file.wipe();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "Session file removed");
        }
        Ok(())
    }
}

/// Volatile store for tests and ephemeral hosts
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store
    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        {
            let mut values = store.values.lock();
            values.insert(CredentialKey::Access, pair.access_token.clone());
            values.insert(CredentialKey::Refresh, pair.refresh_token.clone());
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(&key).cloned())
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        if let Some(mut old) = self.values.lock().insert(key, value.to_string()) {
            old.zeroize();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for (_, mut value) in self.values.lock().drain() {
            value.zeroize();
        }
        Ok(())
    }
}
