//! The sync engine.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeType, ListenerId};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pending::{PendingOp, PendingWriteQueue};
use crate::remote::{RemoteEvent, RemoteStore, SubscriptionId};
use crate::scheduler::LifecycleEvent;
use crate::state::{DeleteReport, EntitySyncState, ReplayReport, SyncStats};
use crate::tombstones::TombstoneRegistry;
use feedsync_model::{
    decode_collection, decode_record, encode_record, merge, record_key, record_prefix, remote_path,
    Clock, Entity, EntityId, EntityKind, Filter, ModelError, SystemClock, Version,
};
use feedsync_storage::{keys_with_prefix, LocalStore};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Offline-first coordinator between a local cache and a remote store.
///
/// The engine owns every piece of sync state: the tombstone registry, the
/// pending write queue, per-entity sync states and the change feed. UI code
/// talks only to the engine.
///
/// # Guarantees
///
/// - A `write` returns only after the local commit, so the next `read` sees it
/// - A tombstoned ID is never returned by `read` and never written again
/// - Queued operations replay in insertion order, at most one cycle at a time
/// - An unreachable remote store never fails a `read`
pub struct SyncEngine<L: LocalStore, R: RemoteStore> {
    config: SyncConfig,
    local: Arc<L>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    tombstones: TombstoneRegistry<L>,
    pending: PendingWriteQueue<L>,
    feed: Arc<ChangeFeed>,
    states: RwLock<HashMap<EntityId, EntitySyncState>>,
    stats: RwLock<SyncStats>,
    /// Serializes local cache commits against read-time cache refreshes.
    commit: tokio::sync::Mutex<()>,
    replaying: AtomicBool,
    failed_cycles: AtomicU32,
    online: AtomicBool,
    /// Signalled whenever an operation is queued for replay.
    queued: Notify,
    /// Bumped around local commits and remote acknowledgements.
    local_epoch: AtomicU64,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// Clears the replay flag even if the cycle is cancelled.
struct ReplayGuard<'a>(&'a AtomicBool);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    /// Opens an engine over `local` and `remote` using the system clock.
    ///
    /// Loads the tombstone registry and the pending queue from `local`.
    pub async fn open(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> SyncResult<Self> {
        Self::open_with_clock(config, local, remote, Arc::new(SystemClock)).await
    }

    /// Opens an engine with an explicit clock.
    pub async fn open_with_clock(
        config: SyncConfig,
        local: Arc<L>,
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let tombstones = TombstoneRegistry::load(Arc::clone(&local)).await?;
        let pending = PendingWriteQueue::load(Arc::clone(&local)).await?;

        let mut states = HashMap::new();
        for entry in pending.drain() {
            if !entry.op.is_delete() {
                states.insert(entry.id, EntitySyncState::PendingRetry);
            }
        }
        for id in tombstones.all() {
            states.insert(id, EntitySyncState::Deleted);
        }

        info!(
            pending = pending.len(),
            tombstones = tombstones.len(),
            "sync engine opened"
        );

        Ok(Self {
            config,
            local,
            remote,
            clock,
            tombstones,
            pending,
            feed: Arc::new(ChangeFeed::new()),
            states: RwLock::new(states),
            stats: RwLock::new(SyncStats::default()),
            commit: tokio::sync::Mutex::new(()),
            replaying: AtomicBool::new(false),
            failed_cycles: AtomicU32::new(0),
            online: AtomicBool::new(true),
            queued: Notify::new(),
            local_epoch: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the tombstone registry.
    pub fn tombstones(&self) -> &TombstoneRegistry<L> {
        &self.tombstones
    }

    /// Returns the pending write queue.
    pub fn pending(&self) -> &PendingWriteQueue<L> {
        &self.pending
    }

    /// Returns the change feed.
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Returns the last observed remote connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the engine statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the sync state of `id`, if the engine has seen it.
    pub fn sync_state(&self, id: &EntityId) -> Option<EntitySyncState> {
        if self.tombstones.contains(id) {
            return Some(EntitySyncState::Deleted);
        }
        self.states.read().get(id).copied()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the merged view of one collection, restricted to `filter`.
    ///
    /// Local and remote are fetched concurrently. When the remote store is
    /// unreachable or slow the result is built from the local cache alone.
    /// When it answers, the merged result is written back to the cache, and
    /// cached records the remote store no longer holds are evicted unless a
    /// local operation for them is still outstanding.
    pub async fn read<E: Entity>(&self, filter: &Filter) -> Vec<E> {
        let epoch = self.local_epoch.load(Ordering::SeqCst);
        let (local, remote) = tokio::join!(self.load_local::<E>(), self.fetch_remote::<E>());
        let remote_ok = remote.is_some();

        let cached: HashMap<EntityId, Version> = local
            .iter()
            .map(|e| (e.id().clone(), e.version()))
            .collect();
        let (local, remote) = match remote {
            Some(remote) => (self.drop_remotely_deleted(local, &remote, epoch), remote),
            None => (local, Vec::new()),
        };

        for entity in remote.iter().filter(|e| e.is_deleted()) {
            self.mirror_remote_delete(E::KIND, entity.id()).await;
        }

        let merged = merge(local, remote, &self.tombstones.all());

        if remote_ok && self.config.refresh_cache_on_read {
            self.refresh_cache(&cached, &merged).await;
        }

        {
            let mut stats = self.stats.write();
            stats.reads += 1;
            if !remote_ok {
                stats.degraded_reads += 1;
            }
        }

        merged.into_iter().filter(|e| e.matches(filter)).collect()
    }

    /// Returns one entity by ID.
    pub async fn get<E: Entity>(&self, id: &EntityId) -> Option<E> {
        self.read::<E>(&Filter::Id(id.clone()))
            .await
            .into_iter()
            .next()
    }

    async fn load_local<E: Entity>(&self) -> Vec<E> {
        let prefix = record_prefix(E::KIND);
        let keys = match keys_with_prefix(self.local.as_ref(), &prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(collection = E::KIND.collection(), error = %e, "local cache unavailable");
                return Vec::new();
            }
        };

        let mut entities = Vec::with_capacity(keys.len());
        for key in keys {
            match self.local.get(&key).await {
                Ok(Some(raw)) => match decode_record::<E>(&key, &raw) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => self.note_parse_failure(&e),
                },
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "failed to read cached record"),
            }
        }
        entities
    }

    async fn fetch_remote<E: Entity>(&self) -> Option<Vec<E>> {
        let path = E::KIND.collection();
        match self.remote_call(self.remote.read_path(path)).await {
            Ok(Some(value)) => {
                let (entities, errors) = decode_collection::<E>(path, value);
                for e in &errors {
                    self.note_parse_failure(e);
                }
                Some(entities)
            }
            Ok(None) => Some(Vec::new()),
            Err(e) => {
                debug!(collection = path, error = %e, "remote read failed, serving cached data");
                self.record_remote_error(&e);
                None
            }
        }
    }

    /// Removes cached records that are absent from a successful remote read.
    ///
    /// Records with a queued operation or a remote write in flight stay. If a
    /// local commit or acknowledgement happened since `epoch`, nothing is
    /// dropped and the next read decides.
    fn drop_remotely_deleted<E: Entity>(&self, local: Vec<E>, remote: &[E], epoch: u64) -> Vec<E> {
        if self.local_epoch.load(Ordering::SeqCst) != epoch {
            return local;
        }
        let present: HashSet<&EntityId> = remote.iter().map(|e| e.id()).collect();
        let states = self.states.read();
        let before = local.len();
        let kept: Vec<E> = local
            .into_iter()
            .filter(|e| {
                let id = e.id();
                present.contains(id)
                    || self.pending.contains(id)
                    || states.get(id).is_some_and(|s| s.is_pending())
            })
            .collect();
        if kept.len() < before {
            debug!(
                collection = E::KIND.collection(),
                dropped = before - kept.len(),
                "dropping records deleted remotely"
            );
        }
        kept
    }

    /// Applies a delete observed on the remote store.
    async fn mirror_remote_delete(&self, kind: EntityKind, id: &EntityId) {
        let now = self.clock.now();
        let result: SyncResult<()> = async {
            if self.tombstones.add(id.clone(), kind, now).await? {
                self.tombstones.confirm_remote(id, now).await?;
                self.pending.remove(id).await?;
                self.set_state(id, EntitySyncState::Deleted);
                self.feed.emit(kind, Some(id.clone()), ChangeType::Delete);
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(%id, error = %e, "failed to record remote delete");
        }
    }

    async fn refresh_cache<E: Entity>(&self, cached: &HashMap<EntityId, Version>, merged: &[E]) {
        let mut changed = 0usize;
        {
            let _commit = self.commit.lock().await;

            for entity in merged {
                let id = entity.id();
                if cached.get(id) == Some(&entity.version()) || self.tombstones.contains(id) {
                    continue;
                }
                let key = record_key(E::KIND, id);
                // A local write may have committed since the snapshot was taken.
                if let Ok(Some(current)) = self.cached_version::<E>(&key).await {
                    if current >= entity.version() {
                        continue;
                    }
                }
                let stored = match encode_record(entity) {
                    Ok(raw) => self.local.set(&key, raw).await.map_err(SyncError::from),
                    Err(e) => Err(e.into()),
                };
                match stored {
                    Ok(()) => changed += 1,
                    Err(e) => warn!(%key, error = %e, "failed to refresh cached record"),
                }
            }

            // Tombstoned, remotely deleted and orphaned records leave the cache.
            let kept: HashSet<&EntityId> = merged.iter().map(|e| e.id()).collect();
            for (id, version) in cached.iter().filter(|(id, _)| !kept.contains(id)) {
                let key = record_key(E::KIND, id);
                if !self.tombstones.contains(id) {
                    // Keep a copy rewritten after the snapshot was taken.
                    if let Ok(Some(current)) = self.cached_version::<E>(&key).await {
                        if current != *version {
                            continue;
                        }
                    }
                }
                match self.local.remove(&key).await {
                    Ok(()) => changed += 1,
                    Err(e) => warn!(%key, error = %e, "failed to evict cached record"),
                }
            }
        }

        if changed > 0 {
            debug!(collection = E::KIND.collection(), changed, "refreshed local cache");
            self.feed.emit(E::KIND, None, ChangeType::Refresh);
        }
    }

    async fn cached_version<E: Entity>(&self, key: &str) -> SyncResult<Option<Version>> {
        Ok(match self.local.get(key).await? {
            Some(raw) => decode_record::<E>(key, &raw).ok().map(|e| e.version()),
            None => None,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Writes `entity` and returns its ID.
    ///
    /// Assigns an ID if absent and stamps a new version. The write is durable
    /// locally before this returns; the remote write is attempted afterwards
    /// and queued for replay if it fails.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] if the entity is invalid or its parent is deleted
    /// - [`SyncError::Tombstoned`] if the ID was deleted earlier
    /// - [`SyncError::Storage`] if the local commit fails
    pub async fn write<E: Entity>(&self, entity: E) -> SyncResult<EntityId> {
        let entity = self.commit_entity(entity).await?;
        Ok(entity.id().clone())
    }

    /// Writes `entity` and returns the stored snapshot.
    pub(crate) async fn commit_entity<E: Entity>(&self, mut entity: E) -> SyncResult<E> {
        entity.assign_id();
        entity.validate()?;
        let id = entity.id().clone();

        if let Some(parent) = entity.parent_id() {
            if self.tombstones.contains(parent) {
                return Err(SyncError::from(ModelError::invalid(
                    E::KIND.name(),
                    format!("parent {parent} has been deleted"),
                )));
            }
        }

        let now = self.clock.now();
        entity.init_created_at(now);
        let key = record_key(E::KIND, &id);

        let entity = {
            let _commit = self.commit.lock().await;
            if self.tombstones.contains(&id) {
                return Err(SyncError::Tombstoned(id));
            }
            let previous = self.cached_version::<E>(&key).await?.unwrap_or(Version::ZERO);
            let version = previous.max(entity.version()).next(now.as_millis());
            let entity = entity.with_version(version);
            let raw = encode_record(&entity)?;
            self.local_epoch.fetch_add(1, Ordering::SeqCst);
            self.local.set(&key, raw).await?;
            self.set_state(&id, EntitySyncState::Created);
            self.local_epoch.fetch_add(1, Ordering::SeqCst);
            entity
        };

        self.stats.write().writes += 1;
        self.feed.emit(E::KIND, Some(id.clone()), ChangeType::Write);
        debug!(collection = E::KIND.collection(), %id, version = %entity.version(), "committed locally");

        let payload = serde_json::to_value(&entity)?;
        self.push(E::KIND, &id, payload).await?;
        Ok(entity)
    }

    async fn push(&self, kind: EntityKind, id: &EntityId, payload: Value) -> SyncResult<()> {
        let superseded = self.pending.current_seq(id);
        self.set_state(id, EntitySyncState::Syncing);

        let path = remote_path(kind, id);
        match self.remote_call(self.remote.write_path(&path, payload.clone())).await {
            Ok(()) => {
                self.local_epoch.fetch_add(1, Ordering::SeqCst);
                if let Some(seq) = superseded {
                    self.pending.remove_if_current(id, seq).await?;
                }
                self.stats.write().remote_acks += 1;
                self.set_state(id, EntitySyncState::Synced);
                self.feed.emit(kind, Some(id.clone()), ChangeType::Synced);
            }
            Err(e) => {
                self.record_remote_error(&e);
                if self.tombstones.contains(id) {
                    // Deleted while in flight; the queued delete wins.
                    return Ok(());
                }
                if e.is_retryable() {
                    debug!(%path, error = %e, "remote unreachable, write queued");
                } else {
                    warn!(%path, error = %e, "remote rejected write, queued for replay");
                }
                self.pending
                    .enqueue(id.clone(), kind, PendingOp::Put { payload }, self.clock.now())
                    .await?;
                self.stats.write().queued += 1;
                self.queued.notify_one();
                self.set_state(id, EntitySyncState::PendingRetry);
            }
        }
        Ok(())
    }

    /// Permanently deletes `id`.
    ///
    /// The ID is tombstoned and evicted from the local cache before the remote
    /// delete is attempted. A failed remote delete is queued and reported in
    /// the returned [`DeleteReport`]; the local deletion stands either way.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the tombstone or the eviction cannot
    /// be persisted.
    pub async fn delete(&self, kind: EntityKind, id: &EntityId) -> SyncResult<DeleteReport> {
        let now = self.clock.now();
        self.tombstones.add(id.clone(), kind, now).await?;
        {
            let _commit = self.commit.lock().await;
            self.local.remove(&record_key(kind, id)).await?;
        }
        self.set_state(id, EntitySyncState::Deleted);
        self.feed.emit(kind, Some(id.clone()), ChangeType::Delete);
        info!(collection = kind.collection(), %id, "deleted");

        let path = remote_path(kind, id);
        match self.remote_call(self.remote.delete_path(&path)).await {
            Ok(()) => {
                self.pending.remove(id).await?;
                self.tombstones.confirm_remote(id, self.clock.now()).await?;
                self.stats.write().remote_acks += 1;
                Ok(DeleteReport {
                    id: id.clone(),
                    remote_confirmed: true,
                    remote_error: None,
                })
            }
            Err(e) => {
                debug!(%path, error = %e, "remote delete failed, queued");
                self.record_remote_error(&e);
                // Replaces any queued write for this ID.
                self.pending
                    .enqueue(id.clone(), kind, PendingOp::Delete, self.clock.now())
                    .await?;
                self.stats.write().queued += 1;
                self.queued.notify_one();
                Ok(DeleteReport {
                    id: id.clone(),
                    remote_confirmed: false,
                    remote_error: Some(e.to_string()),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Replays the pending queue against the remote store.
    ///
    /// Entries are attempted in insertion order. An acknowledged entry is
    /// removed unless a newer operation replaced it meanwhile. The cycle stops
    /// at the first connectivity failure; the report's `next_delay` carries the
    /// backoff before the next attempt. If a cycle is already running this
    /// returns immediately with `skipped` set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the queue cannot be persisted.
    pub async fn replay_pending(&self) -> SyncResult<ReplayReport> {
        if self.replaying.swap(true, Ordering::SeqCst) {
            debug!("replay already running");
            return Ok(ReplayReport::skipped());
        }
        let _running = ReplayGuard(&self.replaying);

        let entries = self.pending.drain();
        if !entries.is_empty() {
            info!(count = entries.len(), "replaying pending operations");
        }

        let mut report = ReplayReport::default();
        for entry in entries {
            let is_delete = entry.op.is_delete();
            if !is_delete && self.tombstones.contains(&entry.id) {
                self.pending.remove_if_current(&entry.id, entry.seq).await?;
                report.dropped += 1;
                debug!(id = %entry.id, "dropped queued write for deleted entity");
                continue;
            }

            report.attempted += 1;
            if !is_delete {
                self.set_state(&entry.id, EntitySyncState::Syncing);
            }

            let path = remote_path(entry.kind, &entry.id);
            let outcome = match &entry.op {
                PendingOp::Put { payload } => {
                    self.remote_call(self.remote.write_path(&path, payload.clone()))
                        .await
                }
                PendingOp::Delete => self.remote_call(self.remote.delete_path(&path)).await,
            };

            match outcome {
                Ok(()) => {
                    report.succeeded += 1;
                    self.local_epoch.fetch_add(1, Ordering::SeqCst);
                    let current = self.pending.remove_if_current(&entry.id, entry.seq).await?;
                    if is_delete {
                        self.tombstones
                            .confirm_remote(&entry.id, self.clock.now())
                            .await?;
                    } else if current {
                        self.set_state(&entry.id, EntitySyncState::Synced);
                        self.feed
                            .emit(entry.kind, Some(entry.id.clone()), ChangeType::Synced);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_remote_error(&e);
                    self.pending.record_failure(&entry.id, entry.seq).await?;
                    if !is_delete {
                        self.set_state(&entry.id, EntitySyncState::PendingRetry);
                    }
                    if e.is_retryable() {
                        debug!(error = %e, "remote unreachable, ending replay cycle");
                        break;
                    }
                    warn!(%path, error = %e, "queued operation rejected");
                }
            }
        }

        report.remaining = self.pending.len();
        let failures = if report.failed > 0 {
            self.failed_cycles.fetch_add(1, Ordering::SeqCst).saturating_add(1)
        } else {
            self.failed_cycles.store(0, Ordering::SeqCst);
            0
        };
        report.next_delay = self.config.retry.delay_for_attempt(failures);

        {
            let mut stats = self.stats.write();
            stats.replay_cycles += 1;
            stats.replayed += report.succeeded as u64;
            stats.dropped += report.dropped as u64;
            stats.last_replay = Some(self.clock.now());
        }

        if report.attempted > 0 || report.dropped > 0 {
            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                dropped = report.dropped,
                remaining = report.remaining,
                "replay cycle finished"
            );
        }
        Ok(report)
    }

    /// Returns how long a background scheduler should wait before the next
    /// replay, or `None` if nothing needs to run.
    pub fn next_replay_delay(&self) -> Option<Duration> {
        let retry = (!self.pending.is_empty()).then(|| {
            let failures = self.failed_cycles.load(Ordering::SeqCst).max(1);
            self.config.retry.delay_for_attempt(failures)
        });
        match (retry, self.config.reconcile_interval) {
            (Some(retry), Some(interval)) => Some(retry.min(interval)),
            (retry, interval) => retry.or(interval),
        }
    }

    /// Resolves once an operation has been queued since the last call.
    pub(crate) async fn work_queued(&self) {
        self.queued.notified().await;
    }

    /// Reacts to an application lifecycle event.
    ///
    /// Foreground, focus and reconnect events run a replay cycle and return
    /// its report. A reconnect also resets the backoff.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) -> SyncResult<Option<ReplayReport>> {
        debug!(?event, "lifecycle event");
        match event {
            LifecycleEvent::ConnectivityLost => {
                self.online.store(false, Ordering::SeqCst);
                Ok(None)
            }
            LifecycleEvent::ConnectivityRestored => {
                self.online.store(true, Ordering::SeqCst);
                self.failed_cycles.store(0, Ordering::SeqCst);
                self.replay_pending().await.map(Some)
            }
            LifecycleEvent::Foreground | LifecycleEvent::ScreenFocused => {
                self.replay_pending().await.map(Some)
            }
        }
    }

    // ------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------

    /// Registers `listener` for changes to entities of `kind`.
    pub fn on_change<F>(&self, kind: EntityKind, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.feed.on_change(kind, listener)
    }

    /// Removes a listener registered with [`on_change`](Self::on_change).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.feed.remove_listener(id)
    }

    /// Returns a channel of future change events.
    pub fn subscribe(&self, kind: Option<EntityKind>) -> UnboundedReceiver<ChangeEvent> {
        self.feed.subscribe(kind)
    }

    /// Forwards remote notifications for every collection to the change feed.
    ///
    /// Returns the number of remote subscriptions held. Calling this twice
    /// does not subscribe twice.
    pub fn attach_remote_subscriptions(&self) -> SyncResult<usize> {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return Ok(subscriptions.len());
        }

        for kind in EntityKind::ALL {
            let feed = Arc::clone(&self.feed);
            let prefix = record_prefix(kind);
            let id = self.remote.subscribe(
                kind.collection(),
                Arc::new(move |event: &RemoteEvent| {
                    let entity_id = event
                        .path
                        .strip_prefix(&prefix)
                        .filter(|rest| !rest.is_empty())
                        .map(EntityId::from);
                    feed.emit(kind, entity_id, ChangeType::Remote);
                }),
            )?;
            subscriptions.push(id);
        }

        debug!(count = subscriptions.len(), "attached remote subscriptions");
        Ok(subscriptions.len())
    }

    /// Drops every remote subscription.
    pub fn detach_remote_subscriptions(&self) {
        for id in self.subscriptions.lock().drain(..) {
            self.remote.unsubscribe(id);
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drops remote-confirmed tombstones older than the configured retention.
    ///
    /// Does nothing when no retention is configured.
    pub async fn compact_tombstones(&self) -> SyncResult<Vec<EntityId>> {
        match self.config.tombstone_retention {
            Some(retention) => self.tombstones.compact(retention, self.clock.now()).await,
            None => Ok(Vec::new()),
        }
    }

    /// Returns whether `id` is tombstoned.
    pub fn is_deleted(&self, id: &EntityId) -> bool {
        self.tombstones.contains(id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn remote_call<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        let result = match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        };
        match &result {
            Ok(_) => self.online.store(true, Ordering::SeqCst),
            Err(e) if e.is_retryable() => self.online.store(false, Ordering::SeqCst),
            Err(_) => {}
        }
        result
    }

    fn set_state(&self, id: &EntityId, next: EntitySyncState) {
        let mut states = self.states.write();
        match states.get(id).copied() {
            Some(current) if current == next => {}
            Some(current) if !current.can_transition_to(next) => {
                debug!(%id, ?current, ?next, "ignoring sync state transition");
            }
            _ => {
                states.insert(id.clone(), next);
            }
        }
    }

    fn note_parse_failure(&self, error: &ModelError) {
        warn!(error = %error, "skipping unreadable record");
        self.stats.write().parse_failures += 1;
    }

    fn record_remote_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }
}

impl<L: LocalStore, R: RemoteStore> Drop for SyncEngine<L, R> {
    fn drop(&mut self) {
        self.detach_remote_subscriptions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use feedsync_model::{ManualClock, Post, Timestamp};
    use feedsync_storage::InMemoryLocalStore;

    type Engine = SyncEngine<InMemoryLocalStore, MemoryRemoteStore>;

    async fn engine() -> (Engine, Arc<MemoryRemoteStore>, Arc<ManualClock>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp(1_000)));
        let engine = SyncEngine::open_with_clock(
            SyncConfig::default(),
            Arc::new(InMemoryLocalStore::new()),
            Arc::clone(&remote),
            clock.clone(),
        )
        .await
        .unwrap();
        (engine, remote, clock)
    }

    #[tokio::test]
    async fn write_stamps_version_and_syncs() {
        let (engine, remote, _) = engine().await;
        let id = engine.write(Post::new("u1", "hello")).await.unwrap();

        let posts: Vec<Post> = engine.read(&Filter::All).await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].version, Version(1_000));
        assert_eq!(posts[0].created_at, Timestamp(1_000));
        assert_eq!(engine.sync_state(&id), Some(EntitySyncState::Synced));
        assert!(remote.get(&format!("posts/{id}")).is_some());
    }

    #[tokio::test]
    async fn rewrite_without_clock_advance_bumps_version() {
        let (engine, _, _) = engine().await;
        let post = engine.commit_entity(Post::new("u1", "a")).await.unwrap();
        let edited = engine.commit_entity(post.edited("b")).await.unwrap();
        assert_eq!(edited.version, Version(1_001));
    }

    #[tokio::test]
    async fn offline_write_is_queued() {
        let (engine, remote, _) = engine().await;
        remote.set_online(false);

        let id = engine.write(Post::new("u1", "offline")).await.unwrap();

        assert_eq!(engine.sync_state(&id), Some(EntitySyncState::PendingRetry));
        assert!(engine.pending().contains(&id));
        assert!(!engine.is_online());
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn invalid_entities_are_rejected_before_commit() {
        let (engine, remote, _) = engine().await;
        let err = engine.write(Post::new("u1", "")).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(engine.local().is_empty());
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn replay_is_single_flight() {
        let (engine, _, _) = engine().await;
        engine.replaying.store(true, Ordering::SeqCst);
        let report = engine.replay_pending().await.unwrap();
        assert!(report.skipped);
        engine.replaying.store(false, Ordering::SeqCst);
        assert!(!engine.replay_pending().await.unwrap().skipped);
    }

    #[tokio::test]
    async fn backoff_grows_with_failed_cycles() {
        let (engine, remote, _) = engine().await;
        remote.set_online(false);
        engine.write(Post::new("u1", "x")).await.unwrap();

        let first = engine.replay_pending().await.unwrap();
        let second = engine.replay_pending().await.unwrap();
        assert_eq!(first.next_delay, Duration::from_secs(1));
        assert_eq!(second.next_delay, Duration::from_secs(2));
        assert_eq!(engine.next_replay_delay(), Some(Duration::from_secs(2)));

        remote.set_online(true);
        let done = engine.replay_pending().await.unwrap();
        assert!(done.is_complete());
        assert_eq!(done.next_delay, Duration::ZERO);
        assert_eq!(engine.next_replay_delay(), None);
    }

    #[tokio::test]
    async fn connectivity_lost_is_recorded() {
        let (engine, _, _) = engine().await;
        let report = engine
            .handle_lifecycle(LifecycleEvent::ConnectivityLost)
            .await
            .unwrap();
        assert!(report.is_none());
        assert!(!engine.is_online());

        let report = engine
            .handle_lifecycle(LifecycleEvent::ConnectivityRestored)
            .await
            .unwrap();
        assert!(report.unwrap().is_complete());
        assert!(engine.is_online());
    }
}
