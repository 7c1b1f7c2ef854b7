//! Persisted credential storage
//!
//! Three string keys hold the signed-in state between runs: the access
//! token, the refresh token and the serialized identity. Writes and removals
//! always cover all of them together.

use crate::error::StorageError;
use papaya::HashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const IDENTITY_KEY: &str = "user";

/// Every key the session owns
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY];

/// Client-local key/value storage
///
/// `set_many` and `remove_many` either apply to every listed key or fail
/// without applying any of them.
pub trait CredentialStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;

    /// Drop everything the store holds, session keys or not
    ///
    /// Used when `remove_many` fails, so credentials never outlive a logout.
    fn wipe(&self) -> Result<(), StorageError>;
}

/// In-memory storage using Papaya HashMap
///
/// Clones share the same map, which is how a "reload" is simulated: build a
/// new client over a clone of the old store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.pin().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let map = self.entries.pin();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let map = self.entries.pin();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn wipe(&self) -> Result<(), StorageError> {
        self.entries.pin().clear();
        Ok(())
    }
}

/// Storage backed by a single JSON object file
///
/// Every change rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read_all()?;
        for (key, value) in entries {
            all.insert((*key).to_string(), (*value).to_string());
        }
        self.write_all(&all)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = match self.read_all() {
            Ok(all) => all,
            // Unreadable contents are dropped wholesale rather than kept around
            Err(StorageError::Serialization(_)) => {
                fs::remove_file(&self.path)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let before = all.len();
        for key in keys {
            all.remove(*key);
        }
        if all.len() == before {
            return Ok(());
        }
        self.write_all(&all)
    }

    fn wipe(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
