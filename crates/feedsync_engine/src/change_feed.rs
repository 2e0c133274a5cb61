//! Change notifications for UI layers.
//!
//! The engine emits one [`ChangeEvent`] per committed local change, per
//! remote acknowledgement, and per remote notification. Listeners register
//! for a single entity kind with [`ChangeFeed::on_change`], or take a channel
//! with [`ChangeFeed::subscribe`].
//!
//! Listeners run synchronously on the emitting task and must not block.

use feedsync_model::{EntityId, EntityKind};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A local write committed.
    Write,
    /// An entity was deleted.
    Delete,
    /// The remote store acknowledged a write.
    Synced,
    /// A read brought newer data into the local cache.
    Refresh,
    /// The remote store reported a change made elsewhere.
    Remote,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Position in the feed.
    pub sequence: u64,
    /// Kind of the changed entities.
    pub kind: EntityKind,
    /// The changed entity, `None` when a whole collection changed.
    pub entity_id: Option<EntityId>,
    /// Type of change.
    pub change_type: ChangeType,
}

/// Callback for change events.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`ChangeFeed::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    kind: Option<EntityKind>,
    listener: ChangeListener,
}

/// Distributes change events to listeners and channel subscribers.
pub struct ChangeFeed {
    listeners: RwLock<Vec<Registration>>,
    subscribers: RwLock<Vec<(Option<EntityKind>, UnboundedSender<ChangeEvent>)>>,
    history: RwLock<VecDeque<ChangeEvent>>,
    max_history: usize,
    sequence: AtomicU64,
    next_listener: AtomicU64,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::with_max_history(1024)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            sequence: AtomicU64::new(0),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Registers `listener` for changes to entities of `kind`.
    pub fn on_change<F>(&self, kind: EntityKind, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    /// Registers `listener` for changes of every kind.
    pub fn on_any_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    fn register(&self, kind: Option<EntityKind>, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push(Registration { id, kind, listener });
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Returns a channel receiving future events, optionally for one kind.
    pub fn subscribe(&self, kind: Option<EntityKind>) -> UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push((kind, tx));
        rx
    }

    /// Emits an event and returns it.
    pub fn emit(
        &self,
        kind: EntityKind,
        entity_id: Option<EntityId>,
        change_type: ChangeType,
    ) -> ChangeEvent {
        let event = ChangeEvent {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            kind,
            entity_id,
            change_type,
        };

        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        self.subscribers.write().retain(|(filter, tx)| {
            if filter.is_some_and(|k| k != kind) {
                return !tx.is_closed();
            }
            tx.send(event.clone()).is_ok()
        });

        // Listeners may register or remove listeners, so call them unlocked.
        let listeners: Vec<ChangeListener> = self
            .listeners
            .read()
            .iter()
            .filter(|r| r.kind.map_or(true, |k| k == kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }

        event
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest emitted sequence number.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn listeners_only_see_their_kind() {
        let feed = ChangeFeed::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        feed.on_change(EntityKind::Post, move |e| sink.lock().push(e.entity_id.clone()));

        feed.emit(EntityKind::Post, Some("p1".into()), ChangeType::Write);
        feed.emit(EntityKind::Comment, Some("c1".into()), ChangeType::Write);

        assert_eq!(*seen.lock(), vec![Some(EntityId::from("p1"))]);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let feed = ChangeFeed::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = feed.on_any_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        feed.emit(EntityKind::Post, None, ChangeType::Refresh);
        assert!(feed.remove_listener(id));
        assert!(!feed.remove_listener(id));
        feed.emit(EntityKind::Post, None, ChangeType::Refresh);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(feed.listener_count(), 0);
    }

    #[test]
    fn subscribers_receive_filtered_events() {
        let feed = ChangeFeed::new();
        let mut posts = feed.subscribe(Some(EntityKind::Post));
        let mut all = feed.subscribe(None);

        feed.emit(EntityKind::Profile, Some("u1".into()), ChangeType::Write);
        feed.emit(EntityKind::Post, Some("p1".into()), ChangeType::Delete);

        assert_eq!(posts.try_recv().unwrap().change_type, ChangeType::Delete);
        assert!(posts.try_recv().is_err());
        assert_eq!(all.try_recv().unwrap().kind, EntityKind::Profile);
        assert_eq!(all.try_recv().unwrap().kind, EntityKind::Post);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::with_max_history(2);
        for _ in 0..3 {
            feed.emit(EntityKind::Post, None, ChangeType::Refresh);
        }

        let events = feed.poll(0, 10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 2);
        assert_eq!(feed.latest_sequence(), 3);
        assert!(feed.poll(3, 10).is_empty());
    }
}
