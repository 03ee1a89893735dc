//! File-backed key-value storage.
//!
//! Keeps the whole store as one JSON object in `~/.sessionkeep/session.json`.
//! Reads are served from an in-memory copy; every write rewrites the file
//! through a temporary file and a rename so a concurrent reader never sees
//! a half-written document.
//!
//! Other processes sharing the file (a second terminal, a companion tool)
//! are picked up by [`FileStorage::sync_from_disk`], which the storage
//! watcher calls when the file changes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::auth::token_store::ACCESS_TOKEN_KEY;
use crate::traits::{KeyValueStorage, StorageError};

/// The storage directory name.
const STORAGE_DIR: &str = ".sessionkeep";

/// The storage file name.
const STORAGE_FILE: &str = "session.json";

/// What changed on disk since the last sync, as far as the access token is
/// concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalChange {
    Unchanged,
    /// Another process stored a different token.
    TokenReplaced,
    /// Another process removed the token.
    TokenRemoved,
}

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, loading whatever is there.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// logged and treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = match read_map(&path) {
            Ok(map) => map,
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    /// Open the default store in the home directory.
    pub fn open_default() -> Result<Self, StorageError> {
        Self::default_path().map(Self::open)
    }

    pub fn default_path() -> Result<PathBuf, StorageError> {
        let home = dirs::home_dir().ok_or_else(|| {
            StorageError::Unavailable("Failed to determine home directory".to_string())
        })?;
        Ok(home.join(STORAGE_DIR).join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload from disk and report what happened to the access token.
    ///
    /// Writes made through this instance are already in the cache, so they
    /// compare equal and report `Unchanged`.
    pub fn sync_from_disk(&self) -> Result<ExternalChange, StorageError> {
        let on_disk = read_map(&self.path)?;
        let mut cache = self.lock()?;

        let before = cache.get(ACCESS_TOKEN_KEY).cloned();
        let after = on_disk.get(ACCESS_TOKEN_KEY).cloned();
        *cache = on_disk;

        let change = match (before, after) {
            (Some(_), None) => ExternalChange::TokenRemoved,
            (before, Some(after)) if before.as_deref() != Some(after.as_str()) => {
                ExternalChange::TokenReplaced
            }
            _ => ExternalChange::Unchanged,
        };
        if change != ExternalChange::Unchanged {
            debug!(?change, "Session file changed on disk");
        }
        Ok(change)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.cache
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_error)?;
            file.write_all(json.as_bytes()).map_err(io_error)?;
            file.sync_all().map_err(io_error)?;
        }
        restrict_permissions(&tmp);
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.lock()?;
        let mut next = cache.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.lock()?;
        if !cache.contains_key(key) {
            return Ok(());
        }
        let mut next = cache.clone();
        next.remove(key);
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }
}

fn read_map(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(io_error(e)),
    };
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&contents).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn io_error(err: std::io::Error) -> StorageError {
    match err.raw_os_error() {
        // ENOSPC
        Some(28) => StorageError::QuotaExceeded,
        _ => StorageError::Io(err.to_string()),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
