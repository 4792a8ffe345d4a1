use alloc::{sync::Arc, vec::Vec};
use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::errors::RegistryErrorKind;

/// Bound on optimistic re-attempts before a write is declared failed.
const SWAP_QUOTA: usize = 20;

/// A persistent, height-balanced search tree keyed by integer hashes.
///
/// `with_upserted` returns a new root sharing all unmodified subtrees; the
/// receiver is never mutated, so a reader holding a root sees a complete,
/// consistent snapshot for the whole traversal.
///
/// Hash equality is treated as key equality: two distinct logical keys with
/// the same 64-bit hash collapse into one entry. Keys here are `ahash` values
/// over `TypeId`s and names, where such collisions are not a practical
/// concern.
#[derive(Clone)]
pub(crate) struct Tree<V> {
    root: Link<V>,
}

type Link<V> = Option<Arc<Node<V>>>;

struct Node<V> {
    key: u64,
    value: V,
    height: u32,
    left: Link<V>,
    right: Link<V>,
}

impl<V> Default for Tree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Tree<V> {
    #[inline]
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { root: None }
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[must_use]
    pub(crate) fn get(&self, key: u64) -> Option<&V> {
        let mut node = self.root.as_deref();
        while let Some(current) = node {
            if key == current.key {
                return Some(&current.value);
            }
            node = if key < current.key {
                current.left.as_deref()
            } else {
                current.right.as_deref()
            };
        }
        None
    }

    /// In-order (ascending key) traversal.
    pub(crate) fn iter(&self) -> Iter<'_, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }

    #[cfg(test)]
    fn height(&self) -> u32 {
        height(self.root.as_ref())
    }
}

impl<V: Clone> Tree<V> {
    /// Returns a new tree containing `value` under `key`. When the key is
    /// already present, `merge` decides the stored value from (old, new).
    #[must_use]
    pub(crate) fn with_upserted(&self, key: u64, value: V, merge: &dyn Fn(&V, &V) -> V) -> Self {
        Self {
            root: Some(upsert(self.root.as_ref(), key, value, merge)),
        }
    }
}

#[inline]
fn height<V>(node: Option<&Arc<Node<V>>>) -> u32 {
    node.map_or(0, |node| node.height)
}

fn make<V>(key: u64, value: V, left: Link<V>, right: Link<V>) -> Arc<Node<V>> {
    let height = 1 + height(left.as_ref()).max(height(right.as_ref()));
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

fn upsert<V: Clone>(node: Option<&Arc<Node<V>>>, key: u64, value: V, merge: &dyn Fn(&V, &V) -> V) -> Arc<Node<V>> {
    let Some(node) = node else {
        return make(key, value, None, None);
    };

    if key == node.key {
        return make(key, merge(&node.value, &value), node.left.clone(), node.right.clone());
    }

    if key < node.key {
        let left = upsert(node.left.as_ref(), key, value, merge);
        rebalanced(node.key, node.value.clone(), Some(left), node.right.clone())
    } else {
        let right = upsert(node.right.as_ref(), key, value, merge);
        rebalanced(node.key, node.value.clone(), node.left.clone(), Some(right))
    }
}

/// Standard height-based rotations around a freshly rebuilt node.
fn rebalanced<V: Clone>(key: u64, value: V, left: Link<V>, right: Link<V>) -> Arc<Node<V>> {
    let left_height = height(left.as_ref());
    let right_height = height(right.as_ref());

    if left_height > right_height + 1 {
        if let Some(l) = &left {
            if height(l.right.as_ref()) > height(l.left.as_ref()) {
                if let Some(pivot) = &l.right {
                    // left-right: the pivot becomes the new root
                    let new_left = make(l.key, l.value.clone(), l.left.clone(), pivot.left.clone());
                    let new_right = make(key, value, pivot.right.clone(), right);
                    return make(pivot.key, pivot.value.clone(), Some(new_left), Some(new_right));
                }
            }
            // left-left: single right rotation
            let new_right = make(key, value, l.right.clone(), right);
            return make(l.key, l.value.clone(), l.left.clone(), Some(new_right));
        }
    } else if right_height > left_height + 1 {
        if let Some(r) = &right {
            if height(r.left.as_ref()) > height(r.right.as_ref()) {
                if let Some(pivot) = &r.left {
                    // right-left
                    let new_left = make(key, value, left, pivot.left.clone());
                    let new_right = make(r.key, r.value.clone(), pivot.right.clone(), r.right.clone());
                    return make(pivot.key, pivot.value.clone(), Some(new_left), Some(new_right));
                }
            }
            // right-right: single left rotation
            let new_left = make(key, value, left, r.left.clone());
            return make(r.key, r.value.clone(), Some(new_left), r.right.clone());
        }
    }

    make(key, value, left, right)
}

pub(crate) struct Iter<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iter<'a, V> {
    fn push_left(&mut self, mut node: Option<&'a Node<V>>) {
        while let Some(current) = node {
            self.stack.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some(&node.value)
    }
}

/// Concurrency-safe holder of a [`Tree`] root: readers load an immutable
/// snapshot without locking, writers publish a recomputed root with one
/// optimistic compare-and-swap and fall back to an advisory-locked, bounded
/// retry loop when they lose the race.
pub(crate) struct ConcurrentTree<V> {
    root: ArcSwap<Tree<V>>,
    write_lock: Mutex<()>,
}

impl<V> Default for ConcurrentTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ConcurrentTree<V> {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            root: ArcSwap::from_pointee(Tree::new()),
            write_lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn snapshot(&self) -> Arc<Tree<V>> {
        self.root.load_full()
    }
}

impl<V: Clone> ConcurrentTree<V> {
    #[must_use]
    pub(crate) fn get(&self, key: u64) -> Option<V> {
        self.root.load().get(key).cloned()
    }

    /// Inserts `value` under `key`, resolving same-key conflicts with `merge`.
    ///
    /// # Errors
    /// Returns [`RegistryErrorKind::SwapQuotaExceeded`] when the retry bound
    /// is exhausted; that indicates pathological write contention and is not
    /// retried here or by callers.
    pub(crate) fn update(&self, key: u64, value: V, merge: &dyn Fn(&V, &V) -> V) -> Result<(), RegistryErrorKind> {
        let current = self.root.load_full();
        let updated = Arc::new(current.with_upserted(key, value.clone(), merge));
        let previous = self.root.compare_and_swap(&current, updated);
        if Arc::ptr_eq(&*previous, &current) {
            return Ok(());
        }

        let _guard = self.write_lock.lock();
        for _ in 0..SWAP_QUOTA {
            let current = self.root.load_full();
            let updated = Arc::new(current.with_upserted(key, value.clone(), merge));
            let previous = self.root.compare_and_swap(&current, updated);
            if Arc::ptr_eq(&*previous, &current) {
                return Ok(());
            }
        }
        Err(RegistryErrorKind::SwapQuotaExceeded)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::{ConcurrentTree, Tree};
    use alloc::{sync::Arc, vec, vec::Vec};
    use std::thread;

    fn keep_new(_old: &u64, new: &u64) -> u64 {
        *new
    }

    #[test]
    fn test_get_and_upsert() {
        let tree = Tree::new();
        assert!(tree.is_empty());
        assert!(tree.get(1).is_none());

        let tree = tree.with_upserted(1, 10, &keep_new).with_upserted(2, 20, &keep_new);
        assert_eq!(tree.get(1), Some(&10));
        assert_eq!(tree.get(2), Some(&20));
        assert!(tree.get(3).is_none());
    }

    #[test]
    fn test_merge_on_existing_key() {
        let tree = Tree::new()
            .with_upserted(7, 1, &keep_new)
            .with_upserted(7, 2, &|old, _new| *old);
        assert_eq!(tree.get(7), Some(&1));
    }

    #[test]
    fn test_persistence() {
        let before = Tree::new().with_upserted(1, 10, &keep_new);
        let after = before.with_upserted(1, 20, &keep_new);

        assert_eq!(before.get(1), Some(&10));
        assert_eq!(after.get(1), Some(&20));
    }

    #[test]
    fn test_stays_balanced_and_ordered() {
        let mut ascending = Tree::new();
        let mut descending = Tree::new();
        for key in 0..256u64 {
            ascending = ascending.with_upserted(key, key, &keep_new);
            descending = descending.with_upserted(255 - key, key, &keep_new);
        }
        for key in 0..256u64 {
            assert_eq!(ascending.get(key), Some(&key));
            assert_eq!(descending.get(key), Some(&(255 - key)));
        }

        let values: Vec<u64> = ascending.iter().copied().collect();
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        // A height-balanced tree of 256 entries stays within ~1.44 * log2(n).
        assert!(ascending.height() <= 12, "height {}", ascending.height());
        assert!(descending.height() <= 12, "height {}", descending.height());
    }

    #[test]
    fn test_concurrent_updates_lose_nothing() {
        let tree = Arc::new(ConcurrentTree::new());

        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let tree = tree.clone();
                thread::spawn(move || {
                    for i in 0..128u64 {
                        tree.update(worker * 128 + i, worker, &keep_new).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = tree.snapshot();
        for worker in 0..8u64 {
            for i in 0..128u64 {
                assert_eq!(snapshot.get(worker * 128 + i), Some(&worker));
            }
        }
    }

    #[test]
    fn test_snapshot_is_stable_under_writes() {
        let tree = ConcurrentTree::new();
        tree.update(1, 1, &keep_new).unwrap();
        let snapshot = tree.snapshot();

        tree.update(2, 2, &keep_new).unwrap();
        assert!(snapshot.get(2).is_none());
        assert_eq!(tree.get(2), Some(2));

        let values = vec![1u64];
        assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), values);
    }
}
