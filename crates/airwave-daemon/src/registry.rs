//! Set of live listener channels.
//!
//! Connections add themselves on `/stream`, and both the disconnect path and
//! the fan-out path may remove the same entry, so removal is idempotent.
//! Iteration works on a snapshot taken under the lock: callbacks are free to
//! register or unregister while it runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct ListenerRegistry<T> {
    listeners: Mutex<BTreeMap<ListenerId, T>>,
    next_id: AtomicU64,
}

impl<T: Clone> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ListenerId, T>> {
        // Map operations never panic midway, so a poisoned map is still consistent.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, channel: T) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, channel);
        id
    }

    /// Returns `true` if the listener was still registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call `f` once for every listener registered at the time of the call.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(ListenerId, &T),
    {
        let snapshot: Vec<(ListenerId, T)> = self
            .lock()
            .iter()
            .map(|(id, ch)| (*id, ch.clone()))
            .collect();
        for (id, channel) in &snapshot {
            f(*id, channel);
        }
    }
}

impl<T: Clone> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
