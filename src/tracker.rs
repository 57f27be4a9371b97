// Per-entity message identity tracking.

use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};

/// Maps entity IDs to the message handle a sink returned when the entity was
/// first announced, so later snapshots edit that message instead of posting a
/// new one.
///
/// Entries are never evicted. The number of entries is bounded by the number
/// of deployments and allocations the cluster produces during the lifetime of
/// the process.
#[derive(Debug, Default)]
pub struct MessageTracker {
    handles: Mutex<HashMap<String, String>>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires exclusive access to the tracked handles.
    ///
    /// The guard is meant to be held across the whole lookup, external call and
    /// record sequence so two upserts for the same sink never race.
    pub async fn lock(&self) -> TrackedHandles<'_> {
        TrackedHandles {
            guard: self.handles.lock().await,
        }
    }

    /// Returns the handle recorded for `entity_id`, if any.
    pub async fn lookup(&self, entity_id: &str) -> Option<String> {
        self.lock().await.lookup(entity_id).map(str::to_owned)
    }

    /// Records `handle` for `entity_id`, replacing any previous handle.
    pub async fn record(&self, entity_id: &str, handle: &str) {
        self.lock().await.record(entity_id, handle);
    }

    /// The number of entities currently tracked.
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Exclusive view over a tracker's handles.
pub struct TrackedHandles<'a> {
    guard: MutexGuard<'a, HashMap<String, String>>,
}

impl TrackedHandles<'_> {
    /// Returns the stored handle. An empty handle counts as absent.
    pub fn lookup(&self, entity_id: &str) -> Option<&str> {
        self.guard
            .get(entity_id)
            .map(String::as_str)
            .filter(|handle| !handle.is_empty())
    }

    /// Stores `handle`, returning the one it replaced.
    pub fn record(&mut self, entity_id: &str, handle: &str) -> Option<String> {
        self.guard.insert(entity_id.to_owned(), handle.to_owned())
    }
}
