//! CLI command implementations.

pub mod compact_tombstones;
pub mod dump_pending;
pub mod inspect;
pub mod tombstones;

use feedsync_storage::FileLocalStore;
use std::path::Path;
use std::sync::Arc;

/// Opens an existing cache directory.
///
/// Fails if the directory does not exist or an application holds it open.
pub fn open_store(path: &Path) -> Result<Arc<FileLocalStore>, Box<dyn std::error::Error>> {
    let store = FileLocalStore::open(path, false)
        .map_err(|e| format!("cannot open cache at {}: {e}", path.display()))?;
    Ok(Arc::new(store))
}
