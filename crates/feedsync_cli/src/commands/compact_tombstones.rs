//! Compact-tombstones command implementation.

use super::open_store;
use feedsync_engine::TombstoneRegistry;
use feedsync_model::{Clock, SystemClock, Timestamp};
use feedsync_storage::FileLocalStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Compaction statistics.
#[derive(Debug, PartialEq, Eq)]
pub struct CompactStats {
    /// Tombstones before compaction.
    pub before: usize,
    /// Tombstones removed (or that would be removed in a dry run).
    pub removed: usize,
    /// Expired tombstones kept because the remote never confirmed them.
    pub unconfirmed: usize,
}

/// Runs the compact-tombstones command.
pub async fn run(
    path: &Path,
    retention_days: u64,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));

    println!("Compacting tombstones at {:?}", path);
    println!("Retention: {retention_days} days");
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let store = open_store(path)?;
    let stats = compact(&store, retention, SystemClock.now(), dry_run).await?;

    println!("  Tombstones:  {}", stats.before);
    println!(
        "  {} {}",
        if dry_run { "Would remove:" } else { "Removed:     " },
        stats.removed
    );
    if stats.unconfirmed > 0 {
        println!(
            "  Kept {} expired tombstones awaiting remote confirmation",
            stats.unconfirmed
        );
    }

    Ok(())
}

/// Compacts the registry of an open cache as of `now`.
pub async fn compact(
    store: &Arc<FileLocalStore>,
    retention: Duration,
    now: Timestamp,
    dry_run: bool,
) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let registry = TombstoneRegistry::load(Arc::clone(store)).await?;
    let before = registry.len();
    let cutoff = now.saturating_sub(retention);
    let unconfirmed = registry
        .entries()
        .iter()
        .filter(|e| e.remote_confirmed_at.is_none() && e.deleted_at <= cutoff)
        .count();

    let removed = if dry_run {
        registry.compaction_candidates(retention, now).len()
    } else {
        registry.compact(retention, now).await?.len()
    };

    Ok(CompactStats {
        before,
        removed,
        unconfirmed,
    })
}
