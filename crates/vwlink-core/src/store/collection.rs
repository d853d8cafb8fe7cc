// ── Reactive keyed collection ──
//
// Concurrent storage with point lookups and a sorted snapshot that is
// re-published through a `watch` channel after every mutation.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// Implemented by everything the store keeps, so the collection can order
/// its snapshot without the caller passing keys around.
pub(crate) trait Keyed {
    type Key: Clone + Ord + Hash + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

/// A reactive collection of one record type.
///
/// Mutations replace whole records (`Arc::make_mut` on update), so readers
/// holding an earlier snapshot never observe a half-applied change.
pub(crate) struct Collection<T: Keyed + Clone + Send + Sync + 'static> {
    by_key: DashMap<T::Key, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> Collection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a record. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, record: T) -> bool {
        let key = record.key();
        let is_new = self.by_key.insert(key, Arc::new(record)).is_none();
        self.publish();
        is_new
    }

    /// Mutate a record in place and publish the result.
    ///
    /// Returns the updated record, or `None` if the key is unknown.
    pub(crate) fn update<Q, F>(&self, key: &Q, f: F) -> Option<Arc<T>>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut entry = self.by_key.get_mut(key)?;
            f(Arc::make_mut(entry.value_mut()));
            Arc::clone(entry.value())
        };
        self.publish();
        Some(updated)
    }

    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn keys(&self) -> Vec<T::Key> {
        let mut keys: Vec<T::Key> = self.by_key.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by_key(|v| v.key());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        key: String,
        value: u32,
    }

    impl Keyed for Item {
        type Key = String;

        fn key(&self) -> String {
            self.key.clone()
        }
    }

    fn item(key: &str, value: u32) -> Item {
        Item {
            key: key.into(),
            value,
        }
    }

    #[test]
    fn upsert_reports_new_keys() {
        let col = Collection::new();
        assert!(col.upsert(item("a", 1)));
        assert!(!col.upsert(item("a", 2)));
        assert_eq!(col.get("a").unwrap().value, 2);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_by_key() {
        let col = Collection::new();
        col.upsert(item("b", 2));
        col.upsert(item("a", 1));
        let keys: Vec<String> = col.snapshot().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn update_leaves_old_snapshots_untouched() {
        let col = Collection::new();
        col.upsert(item("a", 1));
        let before = col.snapshot();

        let after = col.update("a", |i| i.value = 5).unwrap();
        assert_eq!(after.value, 5);
        assert_eq!(before[0].value, 1);
        assert_eq!(col.snapshot()[0].value, 5);
    }

    #[test]
    fn update_unknown_key_is_none() {
        let col: Collection<Item> = Collection::new();
        assert!(col.update("missing", |i| i.value = 1).is_none());
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let col = Collection::new();
        let mut rx = col.subscribe();

        col.upsert(item("a", 1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        col.remove("a");
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
        assert!(col.get("a").is_none());
    }
}
