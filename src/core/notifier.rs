//! Push notifications of job progress to connected owners.
//!
//! At most one listener per owner; registering again replaces the previous
//! one. Delivery is best-effort: an update for an owner with no listener is
//! dropped and never fails the pipeline.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::ProgressUpdate;

/// Sink for progress updates
pub trait ProgressNotifier: Send + Sync {
    /// Deliver `update` to `owner_id` if they are listening
    fn notify(&self, owner_id: &str, update: ProgressUpdate);
}

/// Owner-to-channel registry
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<ProgressUpdate>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<ProgressUpdate>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener for `owner_id`, replacing any existing one
    pub fn register(&self, owner_id: impl Into<String>) -> mpsc::UnboundedReceiver<ProgressUpdate> {
        let owner_id = owner_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        if self.listeners().insert(owner_id.clone(), tx).is_some() {
            debug!(owner_id = %owner_id, "Replaced existing progress listener");
        }
        rx
    }

    /// Drop the listener for `owner_id`
    pub fn unregister(&self, owner_id: &str) -> bool {
        self.listeners().remove(owner_id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

impl ProgressNotifier for ListenerRegistry {
    fn notify(&self, owner_id: &str, update: ProgressUpdate) {
        let mut listeners = self.listeners();
        let Some(tx) = listeners.get(owner_id) else {
            debug!(owner_id, job_id = %update.job_id, "No listener, dropping progress update");
            return;
        };

        if tx.send(update).is_err() {
            debug!(owner_id, "Listener disconnected, removing");
            listeners.remove(owner_id);
        }
    }
}
