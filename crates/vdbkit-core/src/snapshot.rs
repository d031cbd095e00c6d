//! Copy-on-write entry collections.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Identity of an item inside a [`SnapshotSet`]. Two items with the same key
/// are the same entry.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Insertion,
    ByKey,
}

/// A set of uniquely keyed items published as an immutable vector.
///
/// Writers build a new vector and swap it in; readers take a snapshot once
/// and iterate it without locking, never seeing a partial update.
pub struct SnapshotSet<T> {
    items: ArcSwap<Vec<Arc<T>>>,
    order: Order,
}

impl<T: Keyed> Default for SnapshotSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed> fmt::Debug for SnapshotSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.items.load().iter().map(|i| i.key().to_owned()))
            .finish()
    }
}

impl<T: Keyed> SnapshotSet<T> {
    /// Items iterate in insertion order.
    pub fn new() -> Self {
        Self {
            items: ArcSwap::from_pointee(Vec::new()),
            order: Order::Insertion,
        }
    }

    /// Items iterate sorted by key.
    pub fn sorted() -> Self {
        Self {
            items: ArcSwap::from_pointee(Vec::new()),
            order: Order::ByKey,
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.items.load_full()
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.items.load().iter().find(|i| i.key() == key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.load().iter().any(|i| i.key() == key)
    }

    pub fn len(&self) -> usize {
        self.items.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `item` unless an item with the same key exists.
    ///
    /// Returns `Ok(item)` when inserted and `Err(existing)` otherwise.
    pub fn insert(&self, item: Arc<T>) -> Result<Arc<T>, Arc<T>> {
        let mut existing = None;
        self.items.rcu(|current| {
            existing = current.iter().find(|i| i.key() == item.key()).cloned();
            if existing.is_some() {
                return Arc::clone(current);
            }
            let mut next = Vec::clone(current);
            match self.order {
                Order::Insertion => next.push(Arc::clone(&item)),
                Order::ByKey => {
                    let at = next.partition_point(|i| i.key() < item.key());
                    next.insert(at, Arc::clone(&item));
                }
            }
            Arc::new(next)
        });
        match existing {
            Some(found) => Err(found),
            None => Ok(item),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        let mut removed = None;
        self.items.rcu(|current| {
            removed = current.iter().find(|i| i.key() == key).cloned();
            if removed.is_none() {
                return Arc::clone(current);
            }
            Arc::new(current.iter().filter(|i| i.key() != key).cloned().collect())
        });
        removed
    }

    /// Remove everything, returning the removed items.
    pub fn clear(&self) -> Vec<Arc<T>> {
        let previous = self.items.swap(Arc::new(Vec::new()));
        Vec::clone(&previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item(&'static str, u32);

    impl Keyed for Item {
        fn key(&self) -> &str {
            self.0
        }
    }

    fn keys(set: &SnapshotSet<Item>) -> Vec<&'static str> {
        set.snapshot().iter().map(|i| i.0).collect()
    }

    #[test]
    fn insert_keeps_first_instance() {
        let set = SnapshotSet::new();
        let first = set.insert(Arc::new(Item("a", 1))).unwrap();
        let existing = set.insert(Arc::new(Item("a", 2))).unwrap_err();
        assert!(Arc::ptr_eq(&first, &existing));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().1, 1);
    }

    #[test]
    fn insertion_order_preserved() {
        let set = SnapshotSet::new();
        for k in ["c", "a", "b"] {
            set.insert(Arc::new(Item(k, 0))).unwrap();
        }
        assert_eq!(keys(&set), vec!["c", "a", "b"]);
    }

    #[test]
    fn sorted_order_by_key() {
        let set = SnapshotSet::sorted();
        for k in ["c", "a", "b"] {
            set.insert(Arc::new(Item(k, 0))).unwrap();
        }
        assert_eq!(keys(&set), vec!["a", "b", "c"]);
    }

    #[test]
    fn snapshot_is_stable_across_mutation() {
        let set = SnapshotSet::new();
        set.insert(Arc::new(Item("a", 0))).unwrap();
        let before = set.snapshot();
        set.insert(Arc::new(Item("b", 0))).unwrap();
        set.remove("a");
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].0, "a");
        assert_eq!(keys(&set), vec!["b"]);
    }

    #[test]
    fn remove_and_clear() {
        let set = SnapshotSet::new();
        set.insert(Arc::new(Item("a", 0))).unwrap();
        set.insert(Arc::new(Item("b", 0))).unwrap();
        assert!(set.remove("missing").is_none());
        assert_eq!(set.remove("a").unwrap().0, "a");
        assert!(!set.contains("a"));
        assert_eq!(set.clear().len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let set = Arc::new(SnapshotSet::new());
        let writer = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                for round in 0..200 {
                    let key: &'static str = if round % 2 == 0 { "x" } else { "y" };
                    set.insert(Arc::new(Item(key, round))).ok();
                    set.remove(if key == "x" { "y" } else { "x" });
                }
            })
        };
        for _ in 0..200 {
            let snap = set.snapshot();
            let mut seen: Vec<_> = snap.iter().map(|i| i.0).collect();
            seen.dedup();
            assert_eq!(seen.len(), snap.len());
        }
        writer.join().unwrap();
    }
}
