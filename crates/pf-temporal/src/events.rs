//! Change notification
//!
//! A mutation that changes the map's effective content emits one change
//! event carrying the affected superclock range. Observers register a
//! callback and get called after the write lock has been released.
//!
//! Observers must not re-enter the map's write path synchronously from
//! inside the callback; queue the work instead.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pf_core::Superclock;

/// Handle used to unsubscribe
pub type ObserverId = u64;

type ChangeCallback = Arc<dyn Fn(Superclock, Superclock) + Send + Sync>;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Registry of change observers
#[derive(Default)]
pub struct ChangeObservers {
    observers: Mutex<Vec<(ObserverId, ChangeCallback)>>,
}

impl ChangeObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for change events. The callback receives the
    /// start and end of the affected superclock range.
    pub fn subscribe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(Superclock, Superclock) + Send + Sync + 'static,
    {
        let id = NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a previously registered callback. Returns false if the id is
    /// unknown.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Deliver a change event to every observer. Callbacks run on a
    /// snapshot taken outside the lock, so an observer may subscribe or
    /// unsubscribe from within its own callback.
    pub fn emit(&self, start: Superclock, end: Superclock) {
        let snapshot: Vec<ChangeCallback> = self
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(start, end);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }
}

impl std::fmt::Debug for ChangeObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeObservers")
            .field("count", &self.observers.lock().len())
            .finish()
    }
}
