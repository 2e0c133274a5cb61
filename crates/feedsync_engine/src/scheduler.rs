//! Background replay driven by lifecycle events.
//!
//! The scheduler owns a tokio task that replays the pending queue when the
//! application reports a lifecycle event, and on a timer while work is
//! queued. The engine wakes an idle task when it queues an operation.
//!
//! The timer follows the engine's backoff, so an unreachable remote store is
//! retried after 1s, 2s, 4s… up to the configured cap.

use crate::engine::SyncEngine;
use crate::remote::RemoteStore;
use feedsync_storage::LocalStore;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// An application lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application came to the foreground.
    Foreground,
    /// A screen that shows synced data gained focus.
    ScreenFocused,
    /// Network connectivity came back.
    ConnectivityRestored,
    /// Network connectivity was lost.
    ConnectivityLost,
}

enum Command {
    Lifecycle(LifecycleEvent),
    Shutdown,
}

/// Handle to a running replay task.
pub struct ReplayScheduler {
    sender: UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl ReplayScheduler {
    /// Spawns the replay task for `engine` on the current runtime.
    pub fn spawn<L, R>(engine: Arc<SyncEngine<L, R>>) -> Self
    where
        L: LocalStore + 'static,
        R: RemoteStore + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            loop {
                let wakeup = engine.next_replay_delay();

                let command = tokio::select! {
                    command = receiver.recv() => command,
                    _ = tokio::time::sleep(wakeup.unwrap_or_default()), if wakeup.is_some() => {
                        if let Err(e) = engine.replay_pending().await {
                            warn!(error = %e, "scheduled replay failed");
                        }
                        continue;
                    }
                    // New work may shorten the wait; recompute it.
                    _ = engine.work_queued() => continue,
                };

                match command {
                    Some(Command::Lifecycle(event)) => {
                        if let Err(e) = engine.handle_lifecycle(event).await {
                            warn!(?event, error = %e, "replay after lifecycle event failed");
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }
            debug!("replay scheduler stopped");
        });

        Self { sender, handle }
    }

    /// Forwards a lifecycle event. Returns false if the task has stopped.
    pub fn notify(&self, event: LifecycleEvent) -> bool {
        self.sender.send(Command::Lifecycle(event)).is_ok()
    }

    /// Returns true if the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "replay scheduler task failed");
        }
    }
}
