//! Duplicate suppression for server-pushed messages.

use std::{
    collections::HashSet,
    sync::RwLock,
};

/// Monotonically growing set of persistent ids seen this process lifetime.
///
/// The store outlives individual sessions: the read loop appends, the
/// supervisor snapshots for replay on each handshake, and embedders may
/// snapshot to persist the list externally. Insertion order is retained so
/// replay lists reach the server in delivery order.
#[derive(Default)]
pub struct DedupStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl DedupStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with ids already delivered in a previous
    /// process lifetime.
    #[must_use]
    pub fn seeded<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let store = Self::new();
        for id in ids {
            store.observe(&id);
        }
        store
    }

    /// Record `id`, returning `true` if it had not been seen before.
    pub fn observe(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.seen.insert(id.to_owned()) {
            inner.order.push(id.to_owned());
            true
        } else {
            false
        }
    }

    /// Whether `id` has been seen.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.seen.contains(id)
    }

    /// Point-in-time copy of every seen id, in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.order.clone()
    }

    /// Number of ids recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.order.len()
    }

    /// Whether no id has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
