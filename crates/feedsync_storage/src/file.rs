//! File-based local store for persistent caches.
//!
//! A store directory has the following layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ store.json        # All entries as one JSON object
//! └─ store.json.tmp    # Temporary file for atomic rewrites
//! ```
//!
//! Every mutation rewrites `store.json` through the temporary file and a
//! rename, so a crash leaves either the old or the new contents on disk.
//! The in-memory map only changes once that rewrite succeeded.
//!
//! A write costs time proportional to the whole cache: the full map is
//! serialized and fsynced on every `set` and `remove`. This suits the
//! bounded caches of a single client, not bulk storage.
//!
//! A data file that cannot be decoded is renamed to `store.json.corrupt`
//! and the store opens empty. The remote store repopulates the cache on the
//! next reads.

use crate::backend::LocalStore;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const DATA_FILE: &str = "store.json";
const DATA_TEMP: &str = "store.json.tmp";
const DATA_CORRUPT: &str = "store.json.corrupt";

/// A file-based local store.
///
/// Entries are held in memory and written through to disk on every
/// mutation. Data survives process restarts.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on its directory; only one
/// `FileLocalStore` can be open per directory at a time. Within a process,
/// writes are serialized so the file on disk always reflects the latest
/// completed mutation.
///
/// # Example
///
/// ```no_run
/// use feedsync_storage::FileLocalStore;
/// use std::path::Path;
///
/// let store = FileLocalStore::open(Path::new("feed_cache"), true).unwrap();
/// println!("{:?}", store.path());
/// ```
#[derive(Debug)]
pub struct FileLocalStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
    persist: Mutex<()>,
    _lock_file: File,
}

impl FileLocalStore {
    /// Opens or creates a store directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the store directory
    /// * `create_if_missing` - If true, creates the directory if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The data file cannot be read or moved aside
    ///
    /// A data file that is not a JSON object of strings is not an error: it
    /// is moved to `store.json.corrupt` and the store opens empty.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        let data = Self::load(path)?;
        debug!(path = %path.display(), entries = data.len(), "opened local store");

        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(data),
            persist: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the data file.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    /// Returns the path a corrupt data file is moved to.
    #[must_use]
    pub fn corrupt_path(&self) -> PathBuf {
        self.path.join(DATA_CORRUPT)
    }

    fn load(dir: &Path) -> StorageResult<BTreeMap<String, String>> {
        let data_path = dir.join(DATA_FILE);
        if !data_path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = match fs::read_to_string(&data_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Self::quarantine(dir, &e.to_string())?;
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(data) => Ok(data),
            Err(e) => {
                Self::quarantine(dir, &e.to_string())?;
                Ok(BTreeMap::new())
            }
        }
    }

    fn quarantine(dir: &Path, reason: &str) -> StorageResult<()> {
        let target = dir.join(DATA_CORRUPT);
        warn!(
            path = %dir.display(),
            error = reason,
            moved_to = %target.display(),
            "local store data file is corrupt, starting empty"
        );
        fs::rename(dir.join(DATA_FILE), target)?;
        Ok(())
    }

    /// Applies `mutate` to a copy of the map, persists it, then publishes it.
    ///
    /// A failed write leaves the in-memory map untouched.
    async fn mutate<F>(&self, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.persist.lock().await;

        let mut next = self.data.read().clone();
        mutate(&mut next);
        let encoded = serde_json::to_string(&next)?;

        let dir = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, encoded.as_bytes()))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
            .inspect_err(|e| warn!(error = %e, "failed to persist local store"))?;

        *self.data.write() = next;
        Ok(())
    }
}

fn write_atomic(dir: &Path, bytes: &[u8]) -> StorageResult<()> {
    let temp_path = dir.join(DATA_TEMP);
    {
        let mut temp = File::create(&temp_path)?;
        temp.write_all(bytes)?;
        temp.sync_all()?;
    }
    fs::rename(&temp_path, dir.join(DATA_FILE))?;
    Ok(())
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let key = key.to_string();
        self.mutate(move |data| {
            data.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        if !self.data.read().contains_key(key) {
            return Ok(());
        }
        self.mutate(|data| {
            data.remove(key);
        })
        .await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}
