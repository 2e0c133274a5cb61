//! Per-entity sync states and engine statistics.

use feedsync_model::{EntityId, Timestamp};
use std::time::Duration;

/// Where one entity stands relative to the remote store.
///
/// ```text
/// Created ─▶ Syncing ─▶ Synced
///               │  ▲
///               ▼  │
///          PendingRetry
///
/// any state ─▶ Deleted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySyncState {
    /// Committed locally, remote write not yet attempted.
    Created,
    /// A remote write is in flight.
    Syncing,
    /// The remote store holds this version.
    Synced,
    /// The remote write failed and is queued for replay.
    PendingRetry,
    /// Tombstoned.
    Deleted,
}

impl EntitySyncState {
    /// Returns true if the state machine allows moving to `next`.
    pub fn can_transition_to(self, next: EntitySyncState) -> bool {
        use EntitySyncState::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Created, Syncing) => true,
            (Syncing, Synced | PendingRetry) => true,
            (PendingRetry, Syncing) => true,
            // A new local write restarts the cycle.
            (Syncing | Synced | PendingRetry, Created) => true,
            _ => false,
        }
    }

    /// Returns true if the remote store has the latest local version.
    pub fn is_synced(self) -> bool {
        self == EntitySyncState::Synced
    }

    /// Returns true if a remote operation is outstanding.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            EntitySyncState::Created | EntitySyncState::Syncing | EntitySyncState::PendingRetry
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Reads served.
    pub reads: u64,
    /// Reads that fell back to local-only data.
    pub degraded_reads: u64,
    /// Local writes committed.
    pub writes: u64,
    /// Remote writes and deletes acknowledged.
    pub remote_acks: u64,
    /// Operations placed on the pending queue.
    pub queued: u64,
    /// Queued operations replayed successfully.
    pub replayed: u64,
    /// Queued writes dropped because their ID was tombstoned.
    pub dropped: u64,
    /// Records skipped because they could not be decoded.
    pub parse_failures: u64,
    /// Replay cycles run.
    pub replay_cycles: u64,
    /// Time of the last replay cycle.
    pub last_replay: Option<Timestamp>,
    /// Last remote error message.
    pub last_error: Option<String>,
}

/// Result of one replay cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries attempted against the remote store.
    pub attempted: usize,
    /// Entries acknowledged and removed.
    pub succeeded: usize,
    /// Entries that failed and stay queued.
    pub failed: usize,
    /// Writes dropped because their ID was tombstoned.
    pub dropped: usize,
    /// Entries left in the queue.
    pub remaining: usize,
    /// True if another replay cycle was already running.
    pub skipped: bool,
    /// Backoff before the next cycle should run.
    pub next_delay: Duration,
}

impl ReplayReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Returns true if the queue was fully flushed.
    pub fn is_complete(&self) -> bool {
        !self.skipped && self.remaining == 0
    }
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    /// The deleted ID.
    pub id: EntityId,
    /// True if the remote store acknowledged the delete.
    pub remote_confirmed: bool,
    /// Remote failure, when the delete was queued instead.
    pub remote_error: Option<String>,
}
