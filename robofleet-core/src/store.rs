/**
 * SNAPSHOT STORE - single source of truth for the current fleet state
 *
 * ROLE:
 * Holds exactly one `FleetSnapshot` (or nothing before the first successful
 * acquisition) and fans every replacement out to subscribers.
 *
 * LOCKING:
 * - `current` is only held for the `Arc` swap / clone, never across a
 *   subscriber or deriver call, so readers never see a torn snapshot.
 * - `publish` serialises stamping, swap and enqueueing. It is released
 *   before any subscriber runs.
 * - Delivery drains a FIFO of installed snapshots. One caller at a time
 *   drains it; concurrent or nested `replace` calls only enqueue, so
 *   subscribers still see replacements in install order, each with its
 *   own snapshot, and a listener may call `replace` itself.
 */

use crate::models::FleetSnapshot;
use crate::state::{new_state, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use time::OffsetDateTime;
use tracing::debug;

type Listener = Arc<dyn Fn(&Arc<FleetSnapshot>) + Send + Sync>;
type ListenerList = Vec<(u64, Listener)>;

#[derive(Default)]
struct Outbox {
    last_revision: u64,
    pending: VecDeque<Arc<FleetSnapshot>>,
    draining: bool,
}

pub struct SnapshotStore {
    current: RwLock<Option<Arc<FleetSnapshot>>>,
    listeners: Shared<ListenerList>,
    publish: Mutex<Outbox>,
    next_listener_id: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            listeners: new_state(Vec::new()),
            publish: Mutex::new(Outbox::default()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Installs `snapshot` as current and notifies every subscriber once.
    ///
    /// When another thread (or an enclosing listener) is already delivering,
    /// the notification is queued behind it and this call returns at once.
    pub fn replace(&self, mut snapshot: FleetSnapshot) -> Arc<FleetSnapshot> {
        let installed = {
            let mut outbox = self.publish.lock();
            outbox.last_revision += 1;
            snapshot.stamp(outbox.last_revision, OffsetDateTime::now_utc());
            let installed = Arc::new(snapshot);

            *self.current.write() = Some(installed.clone());
            outbox.pending.push_back(installed.clone());

            if outbox.draining {
                return installed;
            }
            outbox.draining = true;
            installed
        };

        self.drain();
        installed
    }

    fn drain(&self) {
        let _release = DrainGuard(&self.publish);
        loop {
            let snapshot = {
                let mut outbox = self.publish.lock();
                match outbox.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };

            let listeners: Vec<Listener> = self
                .listeners
                .lock()
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();

            debug!(
                revision = snapshot.revision(),
                robots = snapshot.len(),
                subscribers = listeners.len(),
                "snapshot installed"
            );

            for listener in listeners {
                listener(&snapshot);
            }
        }
    }

    /// Latest snapshot, or `None` before the first successful acquisition.
    pub fn current(&self) -> Option<Arc<FleetSnapshot>> {
        self.current.read().clone()
    }

    pub fn revision(&self) -> u64 {
        self.current.read().as_ref().map_or(0, |s| s.revision())
    }

    /// Registers a listener invoked after every `replace`.
    /// Dropping the returned handle deregisters it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<FleetSnapshot>) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deregisters every listener (dashboard teardown).
    pub fn clear_subscribers(&self) {
        let mut listeners = self.listeners.lock();
        debug!(count = listeners.len(), "clearing snapshot subscribers");
        listeners.clear();
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands draining back if a listener panics, so later replaces still deliver.
struct DrainGuard<'a>(&'a Mutex<Outbox>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// Deregistration handle returned by [`SnapshotStore::subscribe`].
#[must_use = "dropping a Subscription deregisters the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<ListenerList>>,
}

impl Subscription {
    pub fn cancel(self) {
        // deregistration happens in Drop
    }

    fn deregister(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.deregister();
    }
}
