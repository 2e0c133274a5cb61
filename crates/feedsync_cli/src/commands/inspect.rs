//! Inspect command implementation.

use super::open_store;
use feedsync_engine::{PendingWriteQueue, TombstoneRegistry, PENDING_KEY, TOMBSTONES_KEY};
use feedsync_model::{record_prefix, EntityKind};
use feedsync_storage::{keys_with_prefix, FileLocalStore, LocalStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Cache inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Cache directory.
    pub path: String,
    /// Size of the data file in bytes.
    pub data_size: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
    /// Number of queued operations.
    pub pending_count: usize,
    /// Queued operations that are deletes.
    pub pending_deletes: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Tombstones whose remote delete has not been acknowledged.
    pub unconfirmed_tombstones: usize,
    /// Keys outside every collection and the engine's own records.
    pub unknown_keys: usize,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: &'static str,
    /// Number of cached records.
    pub record_count: usize,
    /// Total record size in bytes.
    pub data_size: usize,
}

/// Runs the inspect command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let result = inspect(&store).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for an open cache.
pub async fn inspect(
    store: &Arc<FileLocalStore>,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let data_size = std::fs::metadata(store.data_path())
        .map(|m| m.len())
        .unwrap_or(0);

    let mut collections = Vec::with_capacity(EntityKind::ALL.len());
    let mut known_keys = 0;
    for kind in EntityKind::ALL {
        let keys = keys_with_prefix(store.as_ref(), &record_prefix(kind)).await?;
        let mut size = 0;
        for key in &keys {
            if let Some(raw) = store.get(key).await? {
                size += raw.len();
            }
        }
        known_keys += keys.len();
        collections.push(CollectionStats {
            name: kind.collection(),
            record_count: keys.len(),
            data_size: size,
        });
    }

    let all_keys = store.keys().await?;
    known_keys += all_keys
        .iter()
        .filter(|k| k.as_str() == PENDING_KEY || k.as_str() == TOMBSTONES_KEY)
        .count();

    let pending = PendingWriteQueue::load(Arc::clone(store)).await?;
    let tombstones = TombstoneRegistry::load(Arc::clone(store)).await?;
    let queued = pending.drain();

    Ok(InspectResult {
        path: store.path().display().to_string(),
        data_size,
        collections,
        pending_count: queued.len(),
        pending_deletes: queued.iter().filter(|e| e.op.is_delete()).count(),
        tombstone_count: tombstones.len(),
        unconfirmed_tombstones: tombstones
            .entries()
            .iter()
            .filter(|e| e.remote_confirmed_at.is_none())
            .count(),
        unknown_keys: all_keys.len().saturating_sub(known_keys),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("FeedSync Cache Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Data file: {}", format_size(result.data_size));
    println!();
    println!("Collections:");
    for col in &result.collections {
        println!(
            "  {:<10} {} records, {}",
            col.name,
            col.record_count,
            format_size(col.data_size as u64)
        );
    }
    println!();
    println!("Sync state:");
    println!(
        "  Pending operations: {} ({} deletes)",
        result.pending_count, result.pending_deletes
    );
    println!(
        "  Tombstones:         {} ({} unconfirmed)",
        result.tombstone_count, result.unconfirmed_tombstones
    );
    if result.unknown_keys > 0 {
        println!();
        println!("Unknown keys: {}", result.unknown_keys);
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_engine::PendingOp;
    use feedsync_model::{EntityId, Timestamp};
    use tempfile::TempDir;

    #[tokio::test]
    async fn counts_records_queue_and_tombstones() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileLocalStore::open(dir.path(), true).unwrap());
        store.set("posts/p1", "{}".into()).await.unwrap();
        store.set("posts/p2", "{}".into()).await.unwrap();
        store.set("profiles/alice", "{}".into()).await.unwrap();
        store.set("stray", "x".into()).await.unwrap();

        let pending = PendingWriteQueue::load(Arc::clone(&store)).await.unwrap();
        pending
            .enqueue(
                EntityId::from("p3"),
                EntityKind::Post,
                PendingOp::Delete,
                Timestamp(1),
            )
            .await
            .unwrap();
        let tombstones = TombstoneRegistry::load(Arc::clone(&store)).await.unwrap();
        tombstones
            .add(EntityId::from("p3"), EntityKind::Post, Timestamp(1))
            .await
            .unwrap();

        let result = inspect(&store).await.unwrap();
        assert_eq!(result.collections[0].name, "posts");
        assert_eq!(result.collections[0].record_count, 2);
        assert_eq!(result.collections[2].record_count, 1);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.pending_deletes, 1);
        assert_eq!(result.tombstone_count, 1);
        assert_eq!(result.unconfirmed_tombstones, 1);
        assert_eq!(result.unknown_keys, 1);
        assert!(result.data_size > 0);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
